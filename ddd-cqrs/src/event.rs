use serde::{Serialize, de::DeserializeOwned};
use std::any::type_name;

/// 可经由消息传输的事件（Event）
///
/// - 负载需可序列化/反序列化，由 `Marshaler` 负责编解码；
/// - `NAME`：事件的稳定名称，作为组内分发的键与消息元数据中的类型名。
///   建议使用常量字符串，避免依赖 `type_name::<T>()` 随重构变化。
///
/// 通常通过 `#[derive(Event)]`（见 `ddd-macros`）自动实现。
pub trait Event: Serialize + DeserializeOwned + Send + Sync + 'static {
    const NAME: &'static str;
}

/// 事件类型描述：声明名称与 Rust 类型路径
///
/// 在注册阶段代替“零值事件”，供 `Marshaler::name` 推导事件名。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventType {
    name: &'static str,
    type_name: &'static str,
}

impl EventType {
    pub fn of<E: Event>() -> Self {
        Self {
            name: E::NAME,
            type_name: type_name::<E>(),
        }
    }

    /// `Event::NAME`
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 完整类型路径，如 `my_app::events::OrderPlaced`
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 去掉模块路径与泛型参数后的类型名，如 `OrderPlaced`
    pub fn short_type_name(&self) -> &'static str {
        let base = self.type_name.split('<').next().unwrap_or(self.type_name);
        base.rsplit("::").next().unwrap_or(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize)]
    struct OrderPlaced;

    impl Event for OrderPlaced {
        const NAME: &'static str = "orders.placed";
    }

    #[derive(Serialize, Deserialize)]
    struct Wrapper<T>(T);

    impl<T> Event for Wrapper<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        const NAME: &'static str = "wrapper";
    }

    #[test]
    fn event_type_names() {
        let ty = EventType::of::<OrderPlaced>();
        assert_eq!(ty.name(), "orders.placed");
        assert!(ty.type_name().ends_with("::OrderPlaced"));
        assert_eq!(ty.short_type_name(), "OrderPlaced");
    }

    #[test]
    fn short_type_name_drops_generic_arguments() {
        let ty = EventType::of::<Wrapper<OrderPlaced>>();
        assert_eq!(ty.short_type_name(), "Wrapper");
    }
}
