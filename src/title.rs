/// Group titles for grouping keys
use std::rc::Rc;

use crate::storage::SettingsStore;

/// Maps a grouping key to the title its group carries: the user's alias, or the key
#[derive(Clone)]
pub struct GroupTitleResolver {
    settings: Rc<SettingsStore>,
}

impl GroupTitleResolver {
    pub fn new(settings: Rc<SettingsStore>) -> GroupTitleResolver {
        GroupTitleResolver { settings }
    }

    pub fn resolve(&self, key: &str) -> String {
        self.settings.with(|settings| settings.title_for(key))
    }
}
