use crate::model::{RouteMatch, RoutesConfig};
use bullet_core::{ConfigError, Event};
use bullet_notify::{Channel, ChannelConfig, ChannelFactory, DispatchTarget};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// 编译后的路由规则：渠道已实例化
pub struct CompiledRoute {
    name: String,
    matcher: RouteMatch,
    channels: Vec<Arc<dyn Channel>>,
    configs: Vec<ChannelConfig>,
}

impl CompiledRoute {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matcher(&self) -> &RouteMatch {
        &self.matcher
    }

    pub fn channels(&self) -> &[Arc<dyn Channel>] {
        &self.channels
    }

    /// 对外展示（渠道配置已打码）
    pub fn describe(&self) -> Value {
        json!({
            "name": self.name,
            "match": self.matcher,
            "channels": self.configs.iter().map(ChannelConfig::redacted).collect::<Vec<_>>(),
        })
    }
}

/// 路由表
///
/// 构建后不可变，重载时整体替换。
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
}

impl RouteTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// 校验并实例化所有渠道，任一渠道非法则整张表构建失败
    pub fn build(config: &RoutesConfig, factory: &ChannelFactory) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        let mut routes = Vec::with_capacity(config.routes.len());

        for (index, rule) in config.routes.iter().enumerate() {
            let name = if rule.name.trim().is_empty() {
                format!("route_{index}")
            } else {
                rule.name.clone()
            };

            if !seen.insert(name.clone()) {
                warn!(route = %name, "Duplicate route name");
            }

            let channels = rule
                .channels
                .iter()
                .map(|channel| {
                    factory.build(channel).map_err(|e| ConfigError::InvalidRoute {
                        route: name.clone(),
                        reason: e.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            if channels.is_empty() {
                warn!(route = %name, "Route has no channels");
            }

            routes.push(CompiledRoute {
                name,
                matcher: rule.matcher.clone(),
                channels,
                configs: rule.channels.clone(),
            });
        }

        Ok(Self { routes })
    }

    pub fn routes(&self) -> &[CompiledRoute] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// 非排他匹配：所有命中的规则都生效，按规则顺序、再按渠道顺序展开，不去重
    pub fn resolve(&self, event: &Event) -> Vec<DispatchTarget> {
        let mut targets = Vec::new();

        for route in self.routes.iter().filter(|r| r.matcher.matches(event)) {
            debug!(
                route = %route.name,
                source = %event.source(),
                channels = route.channels.len(),
                "Route matched"
            );
            targets.extend(
                route
                    .channels
                    .iter()
                    .map(|channel| DispatchTarget::new(route.name.clone(), Arc::clone(channel))),
            );
        }

        targets
    }

    pub fn describe(&self) -> Value {
        Value::Array(self.routes.iter().map(CompiledRoute::describe).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(yaml: &str) -> RouteTable {
        let config = RoutesConfig::from_yaml(yaml).unwrap();
        RouteTable::build(&config, &ChannelFactory::default()).unwrap()
    }

    #[test]
    fn test_unnamed_routes_get_index_names() {
        let table = table(
            r#"
routes:
  - match: {}
    channels:
      - type: slack
        webhook_url: https://hooks.slack.com/services/a
  - name: "  "
    channels: []
"#,
        );

        let names: Vec<&str> = table.routes().iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["route_0", "route_1"]);
    }

    #[test]
    fn test_duplicate_names_are_accepted() {
        let table = table(
            r#"
routes:
  - name: dup
    channels: []
  - name: dup
    channels: []
"#,
        );
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_invalid_channel_names_the_route() {
        let config = RoutesConfig::from_yaml(
            r#"
routes:
  - name: broken
    channels:
      - type: feishu
        webhook_url: not-a-url
"#,
        )
        .unwrap();

        let err = RouteTable::build(&config, &ChannelFactory::default())
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::InvalidRoute { ref route, .. } if route == "broken"));
    }

    #[test]
    fn test_describe_redacts_channels() {
        let table = table(
            r#"
routes:
  - name: ops
    match:
      labels: { team: ops }
    channels:
      - type: dingtalk
        webhook_url: https://oapi.dingtalk.com/robot/send?access_token=secret-token
        secret: SECxxx
"#,
        );

        let described = table.describe();
        assert_eq!(described[0]["name"], "ops");
        assert_eq!(described[0]["match"]["labels"]["team"], "ops");
        assert_eq!(described[0]["channels"][0]["type"], "dingtalk");
        assert!(!described.to_string().contains("secret-token"));
        assert!(!described.to_string().contains("SECxxx"));
    }
}
