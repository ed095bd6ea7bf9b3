/// 队列在 Redis 中使用的键
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueKeys {
    base: String,
}

impl QueueKeys {
    pub fn new(prefix: &str, queue: &str) -> Self {
        Self {
            base: format!("{prefix}:{queue}:"),
        }
    }

    /// 所有键的公共前缀，脚本用它拼出请求哈希键
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn id_counter(&self) -> String {
        format!("{}id", self.base)
    }

    pub fn job(&self, id: &str) -> String {
        format!("{}job:{id}", self.base)
    }

    /// 按 优先级、可领取时间 排序的待处理集合
    pub fn waiting(&self) -> String {
        format!("{}waiting", self.base)
    }

    /// 按可领取时间排序的延迟集合
    pub fn delayed(&self) -> String {
        format!("{}delayed", self.base)
    }

    /// 按锁到期时间排序的处理中集合
    pub fn active(&self) -> String {
        format!("{}active", self.base)
    }

    pub fn completed(&self) -> String {
        format!("{}completed", self.base)
    }

    pub fn failed(&self) -> String {
        format!("{}failed", self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let keys = QueueKeys::new("resource-status", "resource-usage");
        assert_eq!(keys.base(), "resource-status:resource-usage:");
        assert_eq!(keys.job("7"), "resource-status:resource-usage:job:7");
        assert_eq!(keys.waiting(), "resource-status:resource-usage:waiting");
        assert_eq!(keys.failed(), "resource-status:resource-usage:failed");
    }
}
