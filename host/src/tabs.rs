use std::cell::{Cell, RefCell};

use async_trait::async_trait;

use crate::error::HostError;

pub type TabId = i32;

#[async_trait(?Send)]
pub trait Tabs {
    async fn open(&self, url: &str) -> Result<TabId, HostError>;

    async fn close(&self, tab: TabId) -> Result<(), HostError>;
}

/// Records tab operations instead of performing them.
#[derive(Debug, Default)]
pub struct MemoryTabs {
    next_id: Cell<TabId>,
    opened: RefCell<Vec<(TabId, String)>>,
    closed: RefCell<Vec<TabId>>,
}

impl MemoryTabs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> Vec<(TabId, String)> {
        self.opened.borrow().clone()
    }

    pub fn closed(&self) -> Vec<TabId> {
        self.closed.borrow().clone()
    }
}

#[async_trait(?Send)]
impl Tabs for MemoryTabs {
    async fn open(&self, url: &str) -> Result<TabId, HostError> {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.opened.borrow_mut().push((id, url.to_string()));
        Ok(id)
    }

    async fn close(&self, tab: TabId) -> Result<(), HostError> {
        self.closed.borrow_mut().push(tab);
        Ok(())
    }
}
