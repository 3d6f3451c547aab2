/// 资源的一次性绑定槽位。
///
/// # 契约说明（What）
/// - 槽位从空到满只发生一次，之后不再改变；
/// - 重复绑定把被拒绝的资源原样退回，槽位保持原值。
#[derive(Debug)]
pub(crate) struct ResourceBinding<R> {
    slot: Option<R>,
}

impl<R> Default for ResourceBinding<R> {
    fn default() -> Self {
        Self { slot: None }
    }
}

impl<R> ResourceBinding<R> {
    pub(crate) fn bind(&mut self, resource: R) -> Result<&R, R> {
        if self.slot.is_some() {
            return Err(resource);
        }
        Ok(self.slot.insert(resource))
    }

    pub(crate) fn get(&self) -> Option<&R> {
        self.slot.as_ref()
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.slot.is_some()
    }
}
