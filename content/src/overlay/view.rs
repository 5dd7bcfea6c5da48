//! State → view. The overlay rebuilds the whole tree on every transition and
//! hands it to the surface only when it differs from the previous one.

use chrono::{DateTime, Utc};
use shared_types::{ProblemData, Rating};

use super::state::{ContentState, DraftField, OverlayModel};
use super::OverlayAction;

#[derive(Debug, Clone, PartialEq)]
pub enum ViewNode {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: &'static str,
    pub class: String,
    pub attrs: Vec<(&'static str, String)>,
    pub on_click: Option<OverlayAction>,
    pub on_input: Option<DraftField>,
    pub children: Vec<ViewNode>,
}

pub fn el(tag: &'static str, class: impl Into<String>) -> Element {
    Element {
        tag,
        class: class.into(),
        attrs: Vec::new(),
        on_click: None,
        on_input: None,
        children: Vec::new(),
    }
}

impl Element {
    pub fn attr(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.attrs.push((name, value.into()));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.children.push(ViewNode::Text(text.into()));
        self
    }

    pub fn child(mut self, child: impl Into<ViewNode>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = ViewNode>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn on_click(mut self, action: OverlayAction) -> Self {
        self.on_click = Some(action);
        self
    }

    pub fn on_input(mut self, field: DraftField) -> Self {
        self.on_input = Some(field);
        self
    }

    pub fn disabled_if(self, disabled: bool) -> Self {
        if disabled {
            self.attr("disabled", "")
        } else {
            self
        }
    }

    pub fn attr_value(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }
}

impl From<Element> for ViewNode {
    fn from(element: Element) -> Self {
        ViewNode::Element(element)
    }
}

impl ViewNode {
    /// First element (depth-first) whose class list contains `class`.
    pub fn find(&self, class: &str) -> Option<&Element> {
        match self {
            ViewNode::Text(_) => None,
            ViewNode::Element(element) => {
                if element.class.split_whitespace().any(|c| c == class) {
                    return Some(element);
                }
                element.children.iter().find_map(|child| child.find(class))
            }
        }
    }

    pub fn text_content(&self) -> String {
        match self {
            ViewNode::Text(text) => text.clone(),
            ViewNode::Element(element) => element.children.iter().map(ViewNode::text_content).collect(),
        }
    }

    /// Every click action reachable in the tree.
    pub fn actions(&self) -> Vec<OverlayAction> {
        let mut actions = Vec::new();
        self.collect_actions(&mut actions);
        actions
    }

    fn collect_actions(&self, out: &mut Vec<OverlayAction>) {
        if let ViewNode::Element(element) = self {
            if let Some(action) = &element.on_click {
                out.push(action.clone());
            }
            for child in &element.children {
                child.collect_actions(out);
            }
        }
    }
}

pub fn render(model: &OverlayModel, now: DateTime<Utc>) -> ViewNode {
    let indicator = model.indicator(now);
    let bubble = el("button", format!("revu-bubble revu-indicator-{}", indicator.as_str()))
        .attr("title", bubble_title(model))
        .attr("data-drag-handle", "")
        .on_click(OverlayAction::ToggleExpanded)
        .text("R");

    let mut root = el("div", "revu-overlay")
        .attr(
            "style",
            format!("left: {}px; top: {}px", model.position.x, model.position.y),
        )
        .attr("data-state", state_name(&model.content))
        .child(bubble);

    if model.expanded {
        root = root.child(panel(model, now));
    }
    root.into()
}

fn state_name(content: &ContentState) -> &'static str {
    match content {
        ContentState::Loading => "loading",
        ContentState::NotConnected => "not-connected",
        ContentState::NotTracked => "not-tracked",
        ContentState::Problem(_) => "problem",
        ContentState::Error(_) => "error",
    }
}

fn bubble_title(model: &OverlayModel) -> String {
    match &model.content {
        ContentState::Loading => "Revu: loading".to_string(),
        ContentState::NotConnected => "Revu: not connected".to_string(),
        ContentState::NotTracked => "Revu: not tracked".to_string(),
        ContentState::Problem(data) => format!("Revu: {}", data.title),
        ContentState::Error(_) => "Revu: error".to_string(),
    }
}

fn panel(model: &OverlayModel, now: DateTime<Utc>) -> Element {
    let header = el("header", "revu-header")
        .child(el("span", "revu-title").text(model.problem().map_or("Revu", |p| p.title.as_str())))
        .child(
            el("button", "revu-close")
                .attr("aria-label", "Collapse")
                .on_click(OverlayAction::ToggleExpanded)
                .text("×"),
        );

    let body = match &model.content {
        ContentState::Loading => el("p", "revu-muted").text("Loading…"),
        ContentState::NotConnected => el("div", "revu-connect")
            .child(el("p", "").text("Connect Revu to track this problem."))
            .child(el("button", "revu-primary").on_click(OverlayAction::Connect).text("Connect")),
        ContentState::NotTracked => el("div", "revu-untracked")
            .child(el("p", "").text(format!("{} is not in your review queue.", model.context)))
            .child(
                el("button", "revu-primary")
                    .disabled_if(model.busy)
                    .on_click(OverlayAction::Track)
                    .text("Start tracking"),
            ),
        ContentState::Error(message) => el("div", "revu-error-state")
            .child(el("p", "revu-error").text(message.clone()))
            .child(el("button", "revu-retry").on_click(OverlayAction::Retry).text("Retry")),
        ContentState::Problem(_) if model.editing => edit_form(model),
        ContentState::Problem(data) => problem_details(model, data, now),
    };

    el("section", "revu-panel").child(header).child(body)
}

fn problem_details(model: &OverlayModel, data: &ProblemData, now: DateTime<Utc>) -> Element {
    let schedule = match data.next_review_at {
        Some(_) if data.is_due(now) => "Due for review".to_string(),
        Some(at) => format!("Next review {}", at.format("%b %-d, %Y")),
        None => "Not scheduled".to_string(),
    };

    let mut details = el("div", "revu-problem")
        .child(el("p", "revu-schedule").text(schedule))
        .child(el("p", "revu-stats").text(format!(
            "Reviewed {} times · interval {} days",
            data.review_count, data.interval
        )));
    if let Some(difficulty) = &data.difficulty {
        details = details.child(el("span", "revu-difficulty").text(difficulty.clone()));
    }

    details = details.child(el("div", "revu-notes").text(if data.notes.is_empty() {
        "No notes yet.".to_string()
    } else {
        data.notes.clone()
    }));
    details = match data.solution.as_deref() {
        None => details.child(el("p", "revu-muted").text("Solution hidden")),
        Some("") => details,
        Some(solution) => details.child(el("pre", "revu-solution").text(solution)),
    };

    if model.can_save() {
        details = details.child(
            el("button", "revu-edit")
                .disabled_if(model.busy)
                .on_click(OverlayAction::Edit)
                .text("Edit notes"),
        );
    }

    let ratings = Rating::ALL.iter().map(|rating| {
        ViewNode::from(
            el("button", format!("revu-rate revu-rate-{}", rating.label().to_lowercase()))
                .disabled_if(model.busy)
                .on_click(OverlayAction::Review(*rating))
                .text(rating.label()),
        )
    });
    details.child(el("div", "revu-ratings").children(ratings))
}

fn edit_form(model: &OverlayModel) -> Element {
    let mut form = el("div", "revu-edit-form").child(
        el("textarea", "revu-notes-input")
            .attr("placeholder", "Notes")
            .attr("value", model.draft.notes.clone())
            .on_input(DraftField::Notes),
    );
    if let Some(solution) = &model.draft.solution {
        form = form.child(
            el("textarea", "revu-solution-input")
                .attr("placeholder", "Solution")
                .attr("value", solution.clone())
                .on_input(DraftField::Solution),
        );
    }
    if model.save_failed {
        form = form.child(el("p", "revu-error").text("Save failed. Try again."));
    }
    form.child(
        el("div", "revu-actions")
            .child(
                el("button", "revu-primary")
                    .disabled_if(model.busy)
                    .on_click(OverlayAction::Save)
                    .text(if model.busy { "Saving…" } else { "Save" }),
            )
            .child(el("button", "revu-cancel").on_click(OverlayAction::CancelEdit).text("Cancel")),
    )
}

#[cfg(test)]
mod tests {
    use super::super::state::fixtures::two_sum;
    use super::*;
    use shared_types::{OverlayPosition, Platform, ProblemContext};

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    fn expanded_model() -> OverlayModel {
        let mut model = OverlayModel::new(
            ProblemContext::new(Platform::Leetcode, "two-sum"),
            OverlayPosition { x: 10.0, y: 20.0 },
            true,
        );
        model.toggle_expanded();
        model
    }

    #[test]
    fn test_collapsed_view_is_only_the_bubble() {
        let mut model = expanded_model();
        model.toggle_expanded();
        let view = render(&model, now());
        assert!(view.find("revu-panel").is_none());
        let bubble = view.find("revu-bubble").unwrap();
        assert!(bubble.class.contains("revu-indicator-loading"));
        assert_eq!(view.actions(), vec![OverlayAction::ToggleExpanded]);
    }

    #[test]
    fn test_position_is_rendered() {
        let view = render(&expanded_model(), now());
        let ViewNode::Element(root) = &view else {
            panic!("root must be an element");
        };
        assert_eq!(root.attr_value("style"), Some("left: 10px; top: 20px"));
    }

    #[test]
    fn test_problem_view_offers_edit_and_ratings() {
        let mut model = expanded_model();
        model.show_problem(two_sum());
        let view = render(&model, now());

        assert!(view.text_content().contains("Reviewed 2 times"));
        let actions = view.actions();
        assert!(actions.contains(&OverlayAction::Edit));
        for rating in Rating::ALL {
            assert!(actions.contains(&OverlayAction::Review(rating)));
        }
    }

    #[test]
    fn test_error_view_offers_retry() {
        let mut model = expanded_model();
        model.show_error("HTTP error: 502");
        let view = render(&model, now());
        assert!(view.text_content().contains("HTTP error: 502"));
        assert!(view.actions().contains(&OverlayAction::Retry));
    }

    #[test]
    fn test_edit_form_reflects_draft_and_failure() {
        let mut model = expanded_model();
        model.show_problem(two_sum());
        model.start_editing();
        model.begin_save();
        model.save_failed();
        let view = render(&model, now());

        let notes = view.find("revu-notes-input").unwrap();
        assert_eq!(notes.attr_value("value"), Some("hash map"));
        assert_eq!(notes.on_input, Some(DraftField::Notes));
        assert!(view.text_content().contains("Save failed"));
        assert!(view.actions().contains(&OverlayAction::CancelEdit));
    }

    #[test]
    fn test_identical_models_render_identical_trees() {
        let mut model = expanded_model();
        model.show_problem(two_sum());
        assert_eq!(render(&model, now()), render(&model.clone(), now()));
    }
}
