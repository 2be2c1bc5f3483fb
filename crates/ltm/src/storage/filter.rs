//! Filter types for memory queries
//!
//! Provides the criteria used by the store to narrow memory scans by
//! owner, scope, classification and supersession state.

use rusqlite::types::Value;

use crate::memory::types::{Impact, MemoryKind, Region, Tier};

/// Filter criteria for memory queries.
///
/// All fields are optional - when `None`, that filter is not applied.
/// Multiple filters are combined with AND logic.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    /// Owning agent
    pub agent_id: Option<String>,
    /// Exact region
    pub region: Option<Region>,
    /// Exact project (PROJECT-region rows only)
    pub project_id: Option<String>,
    /// AGENT-region rows plus PROJECT rows of this project
    pub visible_in_project: Option<String>,
    /// Filter by kinds (OR logic within this filter)
    pub kinds: Option<Vec<MemoryKind>>,
    /// Filter by impacts (OR logic within this filter)
    pub impacts: Option<Vec<Impact>>,
    /// Filter by tiers (OR logic within this filter)
    pub tiers: Option<Vec<Tier>>,
    /// Include rows that have been superseded (default false)
    pub include_superseded: bool,
    pub session_id: Option<String>,
    /// Rows whose git commit starts with this prefix
    pub commit_prefix: Option<String>,
    pub limit: Option<usize>,
}

impl MemoryFilter {
    /// Create a new empty filter (current rows only)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// What an agent sees while working in a project: its AGENT-region
    /// memories and that project's memories. `None` narrows to AGENT only.
    pub fn visible_in(mut self, project_id: Option<&str>) -> Self {
        match project_id {
            Some(project_id) => self.visible_in_project = Some(project_id.to_string()),
            None => self.region = Some(Region::Agent),
        }
        self
    }

    pub fn with_kinds(mut self, kinds: Vec<MemoryKind>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    pub fn with_impacts(mut self, impacts: Vec<Impact>) -> Self {
        self.impacts = Some(impacts);
        self
    }

    pub fn with_tiers(mut self, tiers: Vec<Tier>) -> Self {
        self.tiers = Some(tiers);
        self
    }

    pub fn include_superseded(mut self, include: bool) -> Self {
        self.include_superseded = include;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_commit_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.commit_prefix = Some(prefix.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check if any filters are set
    pub fn is_empty(&self) -> bool {
        self.agent_id.is_none()
            && self.region.is_none()
            && self.project_id.is_none()
            && self.visible_in_project.is_none()
            && self.kinds.is_none()
            && self.impacts.is_none()
            && self.tiers.is_none()
            && self.include_superseded
            && self.session_id.is_none()
            && self.commit_prefix.is_none()
    }

    /// Build a SQL WHERE clause with positional parameters.
    /// Returns `None` if no condition applies.
    pub fn to_sql_clause(&self) -> Option<(String, Vec<Value>)> {
        let mut conditions = Vec::new();
        let mut params = Vec::new();

        if let Some(ref agent_id) = self.agent_id {
            conditions.push("agent_id = ?".to_string());
            params.push(Value::Text(agent_id.clone()));
        }

        if let Some(region) = self.region {
            conditions.push("region = ?".to_string());
            params.push(Value::Text(region.as_str().to_string()));
        }

        if let Some(ref project_id) = self.project_id {
            conditions.push("project_id = ?".to_string());
            params.push(Value::Text(project_id.clone()));
        }

        if let Some(ref project_id) = self.visible_in_project {
            conditions.push("(region = 'AGENT' OR project_id = ?)".to_string());
            params.push(Value::Text(project_id.clone()));
        }

        push_in_list(&mut conditions, &mut params, "kind", self.kinds.as_deref(), |k| {
            k.as_str()
        });
        push_in_list(&mut conditions, &mut params, "impact", self.impacts.as_deref(), |i| {
            i.as_str()
        });
        push_in_list(&mut conditions, &mut params, "tier", self.tiers.as_deref(), |t| {
            t.as_str()
        });

        if !self.include_superseded {
            conditions.push("superseded_by IS NULL".to_string());
        }

        if let Some(ref session_id) = self.session_id {
            conditions.push("session_id = ?".to_string());
            params.push(Value::Text(session_id.clone()));
        }

        if let Some(ref prefix) = self.commit_prefix {
            conditions.push("git_commit LIKE ? ESCAPE '\\'".to_string());
            params.push(Value::Text(format!("{}%", escape_like(prefix))));
        }

        if conditions.is_empty() {
            None
        } else {
            Some((conditions.join(" AND "), params))
        }
    }
}

fn push_in_list<T: Copy>(
    conditions: &mut Vec<String>,
    params: &mut Vec<Value>,
    column: &str,
    values: Option<&[T]>,
    to_str: impl Fn(T) -> &'static str,
) {
    let Some(values) = values else { return };
    if values.is_empty() {
        // An explicit empty set matches nothing
        conditions.push("0".to_string());
        return;
    }
    let placeholders = vec!["?"; values.len()].join(", ");
    conditions.push(format!("{column} IN ({placeholders})"));
    params.extend(values.iter().map(|v| Value::Text(to_str(*v).to_string())));
}

/// Escape `\`, `%` and `_` for use in a LIKE pattern with `ESCAPE '\'`
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_excludes_superseded() {
        let filter = MemoryFilter::new();
        let (clause, params) = filter.to_sql_clause().expect("clause");
        assert_eq!(clause, "superseded_by IS NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn test_empty_filter() {
        let filter = MemoryFilter::new().include_superseded(true);
        assert!(filter.is_empty());
        assert!(filter.to_sql_clause().is_none());
    }

    #[test]
    fn test_agent_and_kinds() {
        let filter = MemoryFilter::new()
            .for_agent("anima")
            .with_kinds(vec![MemoryKind::Emotional, MemoryKind::Dream]);
        let (clause, params) = filter.to_sql_clause().expect("clause");
        assert_eq!(
            clause,
            "agent_id = ? AND kind IN (?, ?) AND superseded_by IS NULL"
        );
        assert_eq!(
            params,
            vec![
                Value::Text("anima".to_string()),
                Value::Text("EMOTIONAL".to_string()),
                Value::Text("DREAM".to_string()),
            ]
        );
    }

    #[test]
    fn test_visible_in_project() {
        let (clause, _) = MemoryFilter::new()
            .visible_in(Some("p1"))
            .to_sql_clause()
            .expect("clause");
        assert!(clause.contains("(region = 'AGENT' OR project_id = ?)"));

        let (clause, params) = MemoryFilter::new()
            .visible_in(None)
            .to_sql_clause()
            .expect("clause");
        assert!(clause.starts_with("region = ?"));
        assert_eq!(params, vec![Value::Text("AGENT".to_string())]);
    }

    #[test]
    fn test_empty_in_list_matches_nothing() {
        let (clause, _) = MemoryFilter::new()
            .with_tiers(vec![])
            .to_sql_clause()
            .expect("clause");
        assert!(clause.starts_with("0 AND"));
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%_done\\"), "100\\%\\_done\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
