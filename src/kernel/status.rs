use alloc::vec::Vec;
use core::fmt;

use crate::error::KernelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed(KernelError),
}

impl fmt::Display for InitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitStatus::NotStarted => write!(f, "Not Started"),
            InitStatus::InProgress => write!(f, "In Progress"),
            InitStatus::Completed => write!(f, "Completed"),
            InitStatus::Failed(err) => write!(f, "Failed: {}", err),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ComponentStatus {
    pub name: &'static str,
    pub status: InitStatus,
}

/// Progress of the setup phases of one kernel instance.
#[derive(Debug, Default)]
pub struct BootStatus {
    components: Vec<ComponentStatus>,
}

impl BootStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a component. A known name is reset to `NotStarted`.
    pub fn register(&mut self, name: &'static str) {
        match self.find_mut(name) {
            Some(component) => component.status = InitStatus::NotStarted,
            None => self.components.push(ComponentStatus {
                name,
                status: InitStatus::NotStarted,
            }),
        }
    }

    pub fn update(&mut self, name: &str, status: InitStatus) {
        if let Some(component) = self.find_mut(name) {
            component.status = status;
        }
    }

    pub fn status(&self, name: &str) -> Option<InitStatus> {
        self.components
            .iter()
            .find(|component| component.name == name)
            .map(|component| component.status)
    }

    pub fn components(&self) -> &[ComponentStatus] {
        &self.components
    }

    pub fn all_ready(&self) -> bool {
        !self.components.is_empty()
            && self
                .components
                .iter()
                .all(|component| component.status == InitStatus::Completed)
    }

    /// First component that did not complete.
    pub fn blocker(&self) -> Option<&ComponentStatus> {
        self.components
            .iter()
            .find(|component| component.status != InitStatus::Completed)
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut ComponentStatus> {
        self.components
            .iter_mut()
            .find(|component| component.name == name)
    }
}
