/// The browser's tab and group store, as seen by the engine
use async_trait::async_trait;

use crate::error::HostResult;
use crate::tab_data::{GroupId, GroupUpdate, Tab, TabGroup, TabId, WindowId};

/// Asynchronous access to the host's tabs and groups
///
/// Any call may fail with [`HostError::NotFound`](crate::error::HostError)
/// when the tab or group vanished concurrently.
#[async_trait(?Send)]
pub trait TabStore {
    /// Ids of all normal browser windows
    async fn windows(&self) -> HostResult<Vec<WindowId>>;

    async fn tabs_in_window(&self, window_id: WindowId) -> HostResult<Vec<Tab>>;

    async fn tabs_in_group(&self, group_id: GroupId) -> HostResult<Vec<Tab>>;

    async fn tab(&self, tab_id: TabId) -> HostResult<Tab>;

    /// Groups of one window, or of every window when `window_id` is `None`
    async fn groups(&self, window_id: Option<WindowId>) -> HostResult<Vec<TabGroup>>;

    async fn group(&self, group_id: GroupId) -> HostResult<TabGroup>;

    /// Move tabs into `group_id`, or into a new group when it is `None`
    async fn group_tabs(&self, tab_ids: &[TabId], group_id: Option<GroupId>) -> HostResult<GroupId>;

    async fn ungroup_tabs(&self, tab_ids: &[TabId]) -> HostResult<()>;

    async fn update_group(&self, group_id: GroupId, update: GroupUpdate) -> HostResult<()>;
}
