use crate::table::RouteTable;
use arc_swap::ArcSwap;
use bullet_core::Event;
use bullet_notify::DispatchTarget;
use std::sync::Arc;
use tracing::info;

/// 路由器
///
/// 持有当前路由表的原子快照。读者每次只看到一张完整的表，
/// 重载通过 [`Router::replace`] 整体替换。
pub struct Router {
    table: ArcSwap<RouteTable>,
}

impl Router {
    pub fn new(table: RouteTable) -> Self {
        Self {
            table: ArcSwap::from_pointee(table),
        }
    }

    pub fn snapshot(&self) -> Arc<RouteTable> {
        self.table.load_full()
    }

    /// 原子替换路由表，返回旧表
    pub fn replace(&self, table: RouteTable) -> Arc<RouteTable> {
        let count = table.len();
        let previous = self.table.swap(Arc::new(table));
        info!(routes = count, previous = previous.len(), "Route table replaced");
        previous
    }

    /// 计算事件的投递目标；没有命中时返回空列表
    pub fn resolve(&self, event: &Event) -> Vec<DispatchTarget> {
        let table = self.table.load();
        let targets = table.resolve(event);

        if targets.is_empty() {
            info!(
                source = %event.source(),
                event_type = %event.event_type(),
                title = %event.display_title(),
                "No route matched, event discarded"
            );
        }

        targets
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(RouteTable::empty())
    }
}
