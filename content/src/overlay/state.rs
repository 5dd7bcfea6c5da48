use chrono::{DateTime, Utc};
use shared_types::{OverlayPosition, ProblemContext, ProblemData};

/// What the overlay is showing for the current problem.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentState {
    Loading,
    NotConnected,
    NotTracked,
    Problem(ProblemData),
    Error(String),
}

/// Status shown on the collapsed bubble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Loading,
    /// Not connected.
    Warning,
    Due,
    Scheduled,
    Idle,
}

impl Indicator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Indicator::Loading => "loading",
            Indicator::Warning => "warning",
            Indicator::Due => "due",
            Indicator::Scheduled => "scheduled",
            Indicator::Idle => "idle",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DraftField {
    Notes,
    Solution,
}

/// Unsaved edits of the notes/solution form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditDraft {
    pub notes: String,
    /// `None` while the solution is hidden by user settings.
    pub solution: Option<String>,
}

/// Full overlay state. The view is a pure function of it.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayModel {
    pub context: ProblemContext,
    pub content: ContentState,
    pub expanded: bool,
    pub editing: bool,
    /// Last save attempt failed; cleared by the next attempt.
    pub save_failed: bool,
    /// A save or review is in flight.
    pub busy: bool,
    pub draft: EditDraft,
    pub position: OverlayPosition,
    can_save: bool,
}

impl OverlayModel {
    pub fn new(context: ProblemContext, position: OverlayPosition, can_save: bool) -> Self {
        Self {
            context,
            content: ContentState::Loading,
            expanded: false,
            editing: false,
            save_failed: false,
            busy: false,
            draft: EditDraft::default(),
            position,
            can_save,
        }
    }

    pub fn can_save(&self) -> bool {
        self.can_save
    }

    pub fn problem(&self) -> Option<&ProblemData> {
        match &self.content {
            ContentState::Problem(data) => Some(data),
            _ => None,
        }
    }

    pub fn begin_loading(&mut self) {
        self.set_content(ContentState::Loading);
    }

    /// Auth is gone; overrides whatever was shown.
    pub fn show_not_connected(&mut self) {
        self.set_content(ContentState::NotConnected);
    }

    /// Auth came back. Only leaves the not-connected state; returns whether
    /// a reload is due.
    pub fn auth_restored(&mut self) -> bool {
        if self.content != ContentState::NotConnected {
            return false;
        }
        self.begin_loading();
        true
    }

    pub fn show_not_tracked(&mut self) {
        self.set_content(ContentState::NotTracked);
    }

    pub fn show_problem(&mut self, data: ProblemData) {
        self.set_content(ContentState::Problem(data));
    }

    pub fn show_error(&mut self, message: impl Into<String>) {
        self.set_content(ContentState::Error(message.into()));
    }

    fn set_content(&mut self, content: ContentState) {
        self.content = content;
        self.editing = false;
        self.save_failed = false;
        self.busy = false;
    }

    pub fn toggle_expanded(&mut self) {
        self.expanded = !self.expanded;
    }

    /// Enter the edit form. Only from a loaded problem, and only when saving
    /// is possible.
    pub fn start_editing(&mut self) -> bool {
        if !self.can_save || self.editing {
            return false;
        }
        let Some(data) = self.problem() else {
            return false;
        };
        self.draft = EditDraft {
            notes: data.notes.clone(),
            solution: data.solution.clone(),
        };
        self.editing = true;
        self.save_failed = false;
        true
    }

    pub fn update_draft(&mut self, field: DraftField, value: String) {
        if !self.editing {
            return;
        }
        match field {
            DraftField::Notes => self.draft.notes = value,
            DraftField::Solution => {
                if self.draft.solution.is_some() {
                    self.draft.solution = Some(value);
                }
            }
        }
    }

    pub fn cancel_editing(&mut self) {
        self.editing = false;
        self.save_failed = false;
        self.busy = false;
    }

    pub fn begin_save(&mut self) -> Option<EditDraft> {
        if !self.editing || self.busy {
            return None;
        }
        self.busy = true;
        self.save_failed = false;
        Some(self.draft.clone())
    }

    /// Leave editing with the saved values; patches the local copy when the
    /// server did not echo the problem back.
    pub fn save_succeeded(&mut self, updated: Option<ProblemData>) {
        let draft = std::mem::take(&mut self.draft);
        if let ContentState::Problem(data) = &mut self.content {
            match updated {
                Some(updated) => *data = updated,
                None => {
                    data.notes = draft.notes;
                    if draft.solution.is_some() {
                        data.solution = draft.solution;
                    }
                }
            }
        }
        self.editing = false;
        self.busy = false;
        self.save_failed = false;
    }

    /// Stay in the form with a failure flag.
    pub fn save_failed(&mut self) {
        self.busy = false;
        self.save_failed = true;
    }

    pub fn indicator(&self, now: DateTime<Utc>) -> Indicator {
        match &self.content {
            ContentState::Loading => Indicator::Loading,
            ContentState::NotConnected => Indicator::Warning,
            ContentState::Problem(data) if data.is_due(now) => Indicator::Due,
            ContentState::Problem(_) => Indicator::Scheduled,
            ContentState::NotTracked | ContentState::Error(_) => Indicator::Idle,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::two_sum;
    use super::*;
    use shared_types::Platform;

    fn model(can_save: bool) -> OverlayModel {
        OverlayModel::new(
            ProblemContext::new(Platform::Leetcode, "two-sum"),
            OverlayPosition::default(),
            can_save,
        )
    }

    #[test]
    fn test_editing_requires_problem_and_save_capability() {
        let mut m = model(true);
        assert!(!m.start_editing());
        m.show_not_tracked();
        assert!(!m.start_editing());
        m.show_problem(two_sum());
        assert!(m.start_editing());
        assert_eq!(m.draft.notes, "hash map");

        let mut readonly = model(false);
        readonly.show_problem(two_sum());
        assert!(!readonly.start_editing());
    }

    #[test]
    fn test_save_failure_keeps_editing() {
        let mut m = model(true);
        m.show_problem(two_sum());
        m.start_editing();
        m.update_draft(DraftField::Notes, "two pointers".to_string());
        assert!(m.begin_save().is_some());
        assert!(m.begin_save().is_none());
        m.save_failed();
        assert!(m.editing && m.save_failed && !m.busy);
        assert_eq!(m.draft.notes, "two pointers");
    }

    #[test]
    fn test_save_success_patches_problem_locally() {
        let mut m = model(true);
        m.show_problem(two_sum());
        m.start_editing();
        m.update_draft(DraftField::Notes, "two pointers".to_string());
        m.update_draft(DraftField::Solution, "fn main() {}".to_string());
        m.begin_save();
        m.save_succeeded(None);

        assert!(!m.editing);
        let data = m.problem().unwrap();
        assert_eq!(data.notes, "two pointers");
        assert_eq!(data.solution.as_deref(), Some("fn main() {}"));
    }

    #[test]
    fn test_hidden_solution_stays_hidden() {
        let mut m = model(true);
        m.show_problem(ProblemData {
            solution: None,
            ..two_sum()
        });
        m.start_editing();
        m.update_draft(DraftField::Solution, "leak".to_string());
        m.begin_save();
        m.save_succeeded(None);
        assert_eq!(m.problem().unwrap().solution, None);
    }

    #[test]
    fn test_not_connected_overrides_and_exits_to_loading() {
        let mut m = model(true);
        m.show_problem(two_sum());
        m.start_editing();
        m.show_not_connected();
        assert_eq!(m.content, ContentState::NotConnected);
        assert!(!m.editing);

        assert!(m.auth_restored());
        assert_eq!(m.content, ContentState::Loading);
        assert!(!m.auth_restored());
    }

    #[test]
    fn test_expanded_is_independent_of_content() {
        let mut m = model(true);
        m.toggle_expanded();
        m.show_error("boom");
        assert!(m.expanded);
        m.begin_loading();
        assert!(m.expanded);
    }

    #[test]
    fn test_indicator() {
        let now = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let mut m = model(true);
        assert_eq!(m.indicator(now), Indicator::Loading);
        m.show_not_connected();
        assert_eq!(m.indicator(now), Indicator::Warning);
        m.show_problem(ProblemData {
            next_review_at: Some(now),
            ..two_sum()
        });
        assert_eq!(m.indicator(now), Indicator::Due);
        m.show_problem(ProblemData {
            next_review_at: Some(now + chrono::Duration::days(2)),
            ..two_sum()
        });
        assert_eq!(m.indicator(now), Indicator::Scheduled);
        m.show_not_tracked();
        assert_eq!(m.indicator(now), Indicator::Idle);
    }
}
