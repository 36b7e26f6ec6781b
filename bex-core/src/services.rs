//! 共享服务注册表
//!
//! 应用启动时把数据库连接池、客户端等共享工具按名称注册进来，
//! 控制器通过请求上下文按名称和类型取回。注册表由应用实例持有并显式传递，
//! 不存在任何全局命名空间。

use crate::error::{CoreError, CoreResult};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// 类型擦除后的服务实例
pub type SharedService = Arc<dyn Any + Send + Sync>;

/// 服务注册表
///
/// 每个名称只能注册一次，不支持覆盖。
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, SharedService>>,
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册单个服务
    ///
    /// # 示例
    ///
    /// ```
    /// use bex_core::ServiceRegistry;
    ///
    /// let services = ServiceRegistry::new();
    /// services.register("greeting", String::from("hello")).unwrap();
    ///
    /// assert_eq!(*services.get::<String>("greeting").unwrap(), "hello");
    /// assert!(services.register("greeting", String::from("again")).is_err());
    /// ```
    pub fn register<T>(&self, name: impl Into<String>, service: T) -> CoreResult<()>
    where
        T: Any + Send + Sync,
    {
        self.register_arc(name, Arc::new(service))
    }

    pub fn register_arc(&self, name: impl Into<String>, service: SharedService) -> CoreResult<()> {
        self.register_all([(name.into(), service)])
    }

    /// 批量注册
    ///
    /// 按顺序逐个注册，遇到重名立即返回错误，之前的条目保持已注册状态。
    pub fn register_all<I>(&self, entries: I) -> CoreResult<()>
    where
        I: IntoIterator<Item = (String, SharedService)>,
    {
        let mut services = self.services.write();
        for (name, service) in entries {
            if services.contains_key(&name) {
                return Err(CoreError::DuplicateService { name });
            }
            tracing::debug!(service = %name, "Registering service");
            services.insert(name, service);
        }
        Ok(())
    }

    /// 按名称和类型获取服务，类型不匹配时返回 `None`
    pub fn get<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.get_shared(name)
            .and_then(|service| service.downcast::<T>().ok())
    }

    pub fn get_shared(&self, name: &str) -> Option<SharedService> {
        self.services.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Mailer {
        host: String,
    }

    #[test]
    fn test_register_and_get_typed() {
        let services = ServiceRegistry::new();
        services
            .register("mailer", Mailer { host: "smtp.local".into() })
            .unwrap();

        let mailer = services.get::<Mailer>("mailer").unwrap();
        assert_eq!(mailer.host, "smtp.local");
        assert!(services.get::<String>("mailer").is_none());
        assert!(services.get::<Mailer>("unknown").is_none());
    }

    #[test]
    fn test_register_all() {
        let services = ServiceRegistry::new();
        services
            .register_all([
                ("a".to_string(), Arc::new("b".to_string()) as SharedService),
                ("c".to_string(), Arc::new(1_i64) as SharedService),
            ])
            .unwrap();

        assert_eq!(*services.get::<String>("a").unwrap(), "b");
        assert_eq!(*services.get::<i64>("c").unwrap(), 1);
        assert_eq!(services.names(), vec!["a", "c"]);
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let services = ServiceRegistry::new();
        services.register("already", 1_u32).unwrap();

        let err = services.register("already", 2_u32).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateService { ref name } if name == "already"));
        assert_eq!(*services.get::<u32>("already").unwrap(), 1);
    }

    #[test]
    fn test_batch_keeps_entries_before_conflict() {
        let services = ServiceRegistry::new();
        services.register("taken", 0_u8).unwrap();

        let result = services.register_all([
            ("first".to_string(), Arc::new(1_u8) as SharedService),
            ("taken".to_string(), Arc::new(2_u8) as SharedService),
            ("last".to_string(), Arc::new(3_u8) as SharedService),
        ]);

        assert!(result.is_err());
        assert!(services.contains("first"));
        assert!(!services.contains("last"));
    }
}
