use crate::modules::task::model::{CollectorTask, TaskKey};

/// Rotation order for a run: every registered pair once, sorted by
/// (server_type, product_type).
pub fn build_plan(tasks: &[CollectorTask]) -> Vec<TaskKey> {
    let mut plan: Vec<TaskKey> = tasks.iter().map(CollectorTask::key).collect();
    plan.sort();
    plan.dedup();
    plan
}

/// Plan entry chosen for one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub index: usize,
    pub key: TaskKey,
    pub next_cursor: usize,
}

impl Selection {
    pub fn starts_rotation(&self) -> bool {
        self.index == 0
    }

    pub fn completes_rotation(&self) -> bool {
        self.next_cursor == 0
    }
}

/// Entry at `cursor`, wrapping to the start when the cursor ran off the end.
pub fn select(plan: &[TaskKey], cursor: usize) -> Option<Selection> {
    if plan.is_empty() {
        return None;
    }
    let index = if cursor >= plan.len() { 0 } else { cursor };
    Some(Selection {
        index,
        key: plan[index],
        next_cursor: (index + 1) % plan.len(),
    })
}
