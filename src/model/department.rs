use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Department {
    pub id: u64,
    #[schema(example = "ENG")]
    pub code: String,
    #[schema(example = "Engineering")]
    pub name: String,
    pub description: Option<String>,
    pub parent_department_id: Option<u64>,
    pub head_position_id: Option<u64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct NewDepartment {
    #[schema(example = "ENG")]
    pub code: String,
    #[schema(example = "Engineering")]
    pub name: String,
    pub description: Option<String>,
    pub parent_department_id: Option<u64>,
    pub head_position_id: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct DepartmentUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub parent_department_id: Option<u64>,
    pub head_position_id: Option<u64>,
}

/// A department with its child departments, as returned by the hierarchy endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DepartmentNode {
    #[serde(flatten)]
    pub department: Department,
    pub children: Vec<DepartmentNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Position {
    pub id: u64,
    #[schema(example = "ENG-LEAD")]
    pub code: String,
    #[schema(example = "Engineering Lead")]
    pub title: String,
    pub department_id: u64,
    pub reports_to_position_id: Option<u64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct NewPosition {
    pub code: String,
    pub title: String,
    pub department_id: u64,
    pub reports_to_position_id: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct PositionUpdate {
    pub title: Option<String>,
    pub department_id: Option<u64>,
    pub reports_to_position_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PositionAssignment {
    pub id: u64,
    pub employee_id: u64,
    pub position_id: u64,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct NewAssignment {
    pub employee_id: u64,
    pub position_id: u64,
    pub start_date: NaiveDate,
}

impl Department {
    pub fn apply(&mut self, update: &DepartmentUpdate) {
        if let Some(v) = &update.name {
            self.name = v.clone();
        }
        if update.description.is_some() {
            self.description = update.description.clone();
        }
        if update.parent_department_id.is_some() {
            self.parent_department_id = update.parent_department_id;
        }
        if update.head_position_id.is_some() {
            self.head_position_id = update.head_position_id;
        }
    }
}

impl Position {
    pub fn apply(&mut self, update: &PositionUpdate) {
        if let Some(v) = &update.title {
            self.title = v.clone();
        }
        if let Some(v) = update.department_id {
            self.department_id = v;
        }
        if update.reports_to_position_id.is_some() {
            self.reports_to_position_id = update.reports_to_position_id;
        }
    }
}

/// Builds the department forest. Departments whose parent is missing from
/// `departments` are treated as roots, and a parent loop is broken at its
/// lowest id so every department appears exactly once.
pub fn build_hierarchy(departments: Vec<Department>) -> Vec<DepartmentNode> {
    let known: std::collections::HashSet<u64> = departments.iter().map(|d| d.id).collect();
    let mut by_parent: HashMap<Option<u64>, Vec<Department>> = HashMap::new();

    for dept in departments {
        let parent = dept.parent_department_id.filter(|p| known.contains(p));
        by_parent.entry(parent).or_default().push(dept);
    }

    fn attach(
        parent: Option<u64>,
        by_parent: &mut HashMap<Option<u64>, Vec<Department>>,
    ) -> Vec<DepartmentNode> {
        let mut level = by_parent.remove(&parent).unwrap_or_default();
        level.sort_by_key(|d| d.id);
        level
            .into_iter()
            .map(|department| {
                let children = attach(Some(department.id), by_parent);
                DepartmentNode {
                    department,
                    children,
                }
            })
            .collect()
    }

    let mut roots = attach(None, &mut by_parent);
    while let Some(id) = by_parent.values().flatten().map(|d| d.id).min() {
        let mut department = None;
        by_parent.retain(|_, level| {
            if let Some(i) = level.iter().position(|d| d.id == id) {
                department = Some(level.remove(i));
            }
            !level.is_empty()
        });
        if let Some(department) = department {
            let children = attach(Some(id), &mut by_parent);
            roots.push(DepartmentNode {
                department,
                children,
            });
        }
    }
    roots
}

/// Walks `parent_of` from `start`; true if `target` is reached.
///
/// Used for both department parents and position reporting lines, so a
/// proposed link `child -> parent` is rejected when `parent` already
/// descends from `child`.
pub fn reaches<F>(start: u64, target: u64, parent_of: F) -> bool
where
    F: Fn(u64) -> Option<u64>,
{
    let mut seen = std::collections::HashSet::new();
    let mut current = Some(start);
    while let Some(id) = current {
        if id == target {
            return true;
        }
        if !seen.insert(id) {
            return false;
        }
        current = parent_of(id);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dept(id: u64, code: &str, parent: Option<u64>) -> Department {
        let now = Utc::now();
        Department {
            id,
            code: code.to_string(),
            name: code.to_string(),
            description: None,
            parent_department_id: parent,
            head_position_id: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn lone_department_has_no_children() {
        let tree = build_hierarchy(vec![dept(1, "ENG", None)]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].department.code, "ENG");
        assert!(tree[0].children.is_empty());
    }

    #[test]
    fn nests_children_under_parents() {
        let tree = build_hierarchy(vec![
            dept(3, "QA", Some(1)),
            dept(1, "ENG", None),
            dept(2, "OPS", None),
            dept(4, "WEB", Some(1)),
            dept(5, "FE", Some(4)),
        ]);
        let codes: Vec<_> = tree.iter().map(|n| n.department.code.as_str()).collect();
        assert_eq!(codes, ["ENG", "OPS"]);
        let eng = &tree[0];
        assert_eq!(eng.children.len(), 2);
        assert_eq!(eng.children[1].children[0].department.code, "FE");
    }

    #[test]
    fn orphan_is_promoted_to_root() {
        let tree = build_hierarchy(vec![dept(7, "LOST", Some(99))]);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn parent_loop_is_listed_from_its_lowest_id() {
        let tree = build_hierarchy(vec![
            dept(1, "ENG", None),
            dept(5, "B", Some(4)),
            dept(4, "A", Some(6)),
            dept(6, "C", Some(5)),
            dept(7, "D", Some(6)),
        ]);
        let codes: Vec<_> = tree.iter().map(|n| n.department.code.as_str()).collect();
        assert_eq!(codes, ["ENG", "A"]);
        // A -> B -> C -> D
        let mut node = &tree[1];
        for code in ["B", "C", "D"] {
            assert_eq!(node.children.len(), 1);
            node = &node.children[0];
            assert_eq!(node.department.code, code);
        }
        assert!(node.children.is_empty());
    }

    #[test]
    fn detects_cycles() {
        // 3 -> 2 -> 1
        let parents = |id: u64| match id {
            3 => Some(2),
            2 => Some(1),
            _ => None,
        };
        assert!(reaches(3, 1, parents));
        assert!(!reaches(1, 3, parents));
    }
}
