pub const TOOL_ISSUE: &str = "manage_jira_issue";
pub const TOOL_SPRINT: &str = "manage_jira_sprint";
pub const TOOL_BOARD: &str = "manage_jira_board";
pub const TOOL_PROJECT: &str = "manage_jira_project";
pub const TOOL_FILTER: &str = "manage_jira_filter";

pub const FIELD_OPERATION: &str = "operation";
pub const FIELD_EXPAND: &str = "expand";
pub const FIELD_START_AT: &str = "startAt";
pub const FIELD_MAX_RESULTS: &str = "maxResults";

pub const EXPAND_COMMENTS: &str = "comments";
pub const EXPAND_TRANSITIONS: &str = "transitions";
pub const EXPAND_ATTACHMENTS: &str = "attachments";
pub const EXPAND_RELATED_ISSUES: &str = "related_issues";
pub const EXPAND_HISTORY: &str = "history";

pub const EXPAND_ISSUES: &str = "issues";
pub const EXPAND_REPORT: &str = "report";
pub const EXPAND_BOARD: &str = "board";

pub const EXPAND_SPRINTS: &str = "sprints";
pub const EXPAND_CONFIGURATION: &str = "configuration";

pub const EXPAND_BOARDS: &str = "boards";
pub const EXPAND_COMPONENTS: &str = "components";
pub const EXPAND_VERSIONS: &str = "versions";
pub const EXPAND_RECENT_ISSUES: &str = "recent_issues";

pub const EXPAND_PERMISSIONS: &str = "permissions";
pub const EXPAND_ISSUE_COUNT: &str = "issue_count";

pub const ISSUE_EXPANSIONS: &[&str] = &[
    EXPAND_COMMENTS,
    EXPAND_TRANSITIONS,
    EXPAND_ATTACHMENTS,
    EXPAND_RELATED_ISSUES,
    EXPAND_HISTORY,
];
pub const SPRINT_EXPANSIONS: &[&str] = &[EXPAND_ISSUES, EXPAND_REPORT, EXPAND_BOARD];
pub const BOARD_EXPANSIONS: &[&str] = &[EXPAND_SPRINTS, EXPAND_ISSUES, EXPAND_CONFIGURATION];
pub const PROJECT_EXPANSIONS: &[&str] = &[
    EXPAND_BOARDS,
    EXPAND_COMPONENTS,
    EXPAND_VERSIONS,
    EXPAND_RECENT_ISSUES,
];
pub const FILTER_EXPANSIONS: &[&str] = &[EXPAND_PERMISSIONS, EXPAND_ISSUE_COUNT];

/// List filter keys understood by every upstream implementation.
pub const FILTER_BOARD_ID: &str = "boardId";
pub const FILTER_STATE: &str = "state";
pub const FILTER_PROJECT_KEY: &str = "projectKey";
pub const FILTER_TYPE: &str = "type";
pub const FILTER_NAME: &str = "name";
pub const FILTER_QUERY: &str = "query";
pub const FILTER_JQL: &str = "jql";

pub const ACTION_TRANSITION: &str = "transition";
pub const ACTION_COMMENT: &str = "comment";
pub const ACTION_LINK: &str = "link";
pub const ACTION_ADD_ISSUES: &str = "add_issues";
pub const ACTION_REMOVE_ISSUES: &str = "remove_issues";

pub const DEFAULT_START_AT: u64 = 0;
pub const DEFAULT_MAX_RESULTS: u64 = 50;
pub const MAX_RESULTS_CAP: u64 = 100;

#[must_use]
pub fn project_recent_issues_jql(project_key: &str) -> String {
    format!("project = {project_key} ORDER BY updated DESC")
}

#[must_use]
pub fn sprint_issues_jql(sprint_id: &str) -> String {
    format!("sprint = {sprint_id}")
}
