use crate::model::Task;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageView {
    Empty,
    Page {
        task: Task,
        index: usize,
        total: usize,
    },
}

impl PageView {
    /// `"3/5"`-style position label, if there is a page.
    pub fn label(&self) -> Option<String> {
        match self {
            Self::Empty => None,
            Self::Page { index, total, .. } => Some(format!("{}/{}", index + 1, total)),
        }
    }
}

/// Reduces any cursor to a valid index for `total` items.
pub fn wrap_page(page: i64, total: usize) -> Option<usize> {
    if total == 0 {
        return None;
    }
    let total = i64::try_from(total).unwrap_or(i64::MAX);
    usize::try_from(page.rem_euclid(total)).ok()
}

pub fn next_page(page: i64, total: usize) -> i64 {
    step(page, 1, total)
}

pub fn prev_page(page: i64, total: usize) -> i64 {
    step(page, -1, total)
}

fn step(page: i64, delta: i64, total: usize) -> i64 {
    match wrap_page(page.saturating_add(delta), total) {
        Some(index) => index as i64,
        None => 0,
    }
}

pub fn page_of(mut tasks: Vec<Task>, page: i64) -> PageView {
    let total = tasks.len();
    match wrap_page(page, total) {
        Some(index) => PageView::Page {
            task: tasks.swap_remove(index),
            index,
            total,
        },
        None => PageView::Empty,
    }
}
