//! Deterministic depth-first walk over node-map exports
//!
//! Node maps look like `{node_id: {id, parent, children, message}}`. Roots are
//! nodes without a (known) parent, visited in id order. Children are visited
//! in their `children` order, followed by any nodes that name the parent but
//! are missing from its list (in id order). Every visited node consumes one
//! position, whether or not it ends up as a stored message.

use anyhow::Result;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// One visited node
pub(crate) struct TreeVisit<'a> {
    pub node_id: &'a str,
    pub node: &'a Value,
    pub position: i64,
    /// Position of the nearest ancestor the visitor kept
    pub parent_position: Option<i64>,
}

/// Walk the tree; `visit` returns whether the node was kept as a message.
pub(crate) fn walk<'a, F>(mapping: &'a Map<String, Value>, mut visit: F) -> Result<()>
where
    F: FnMut(TreeVisit<'a>) -> Result<bool>,
{
    let parent_of = |node: &'a Value| -> Option<&'a str> {
        node.get("parent")
            .and_then(Value::as_str)
            .filter(|p| mapping.contains_key(*p))
    };

    let mut roots: Vec<&'a str> = vec![];
    let mut children: HashMap<&'a str, Vec<&'a str>> = HashMap::new();

    for (id, node) in mapping {
        let listed: Vec<&'a str> = node
            .get("children")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .filter(|c| mapping.contains_key(*c))
                    .collect()
            })
            .unwrap_or_default();
        if !listed.is_empty() {
            children.insert(id.as_str(), listed);
        }
    }

    // Nodes that point at a parent whose list omits them go after the listed ones
    let mut stragglers: Vec<(&'a str, &'a str)> = vec![];
    for (id, node) in mapping {
        match parent_of(node) {
            None => roots.push(id.as_str()),
            Some(parent) => {
                let listed = children
                    .get(parent)
                    .map(|kids| kids.contains(&id.as_str()))
                    .unwrap_or(false);
                if !listed {
                    stragglers.push((parent, id.as_str()));
                }
            }
        }
    }
    stragglers.sort_unstable();
    for (parent, id) in stragglers {
        children.entry(parent).or_default().push(id);
    }

    roots.sort_unstable();

    // Nodes trapped in a parent cycle are unreachable from any root; they
    // start their own walk once the real roots are exhausted.
    let mut starts = roots
        .into_iter()
        .chain(mapping.keys().map(String::as_str));

    let mut visited: HashSet<&'a str> = HashSet::new();
    let mut next_position: i64 = 0;
    let mut stack: Vec<(&'a str, Option<i64>)> = vec![];

    loop {
        let next = match stack.pop() {
            Some(entry) => Some(entry),
            None => starts.find(|id| !visited.contains(id)).map(|id| (id, None)),
        };
        let Some((id, parent_position)) = next else {
            break;
        };
        if !visited.insert(id) {
            continue;
        }
        let Some(node) = mapping.get(id) else {
            continue;
        };

        let position = next_position;
        next_position += 1;

        let kept = visit(TreeVisit {
            node_id: id,
            node,
            position,
            parent_position,
        })?;
        let inherited = if kept { Some(position) } else { parent_position };

        if let Some(kids) = children.get(id) {
            for kid in kids.iter().rev() {
                if !visited.contains(kid) {
                    stack.push((*kid, inherited));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collect(mapping: &Value, keep: impl Fn(&str) -> bool) -> Vec<(String, i64, Option<i64>)> {
        let mut seen = vec![];
        walk(mapping.as_object().unwrap(), |v| {
            seen.push((v.node_id.to_string(), v.position, v.parent_position));
            Ok(keep(v.node_id))
        })
        .unwrap();
        seen
    }

    #[test]
    fn test_depth_first_in_child_order() {
        let mapping = json!({
            "root": {"id": "root", "parent": null, "children": ["b", "a"]},
            "a": {"id": "a", "parent": "root", "children": []},
            "b": {"id": "b", "parent": "root", "children": ["b1"]},
            "b1": {"id": "b1", "parent": "b", "children": []},
        });
        let seen = collect(&mapping, |_| true);
        assert_eq!(
            seen,
            vec![
                ("root".to_string(), 0, None),
                ("b".to_string(), 1, Some(0)),
                ("b1".to_string(), 2, Some(1)),
                ("a".to_string(), 3, Some(0)),
            ]
        );
    }

    #[test]
    fn test_dropped_nodes_keep_positions_and_pass_parent_through() {
        let mapping = json!({
            "root": {"id": "root", "parent": null, "children": ["q"]},
            "q": {"id": "q", "parent": "root", "children": ["r"]},
            "r": {"id": "r", "parent": "q", "children": []},
        });
        let seen = collect(&mapping, |id| id != "root");
        assert_eq!(
            seen,
            vec![
                ("root".to_string(), 0, None),
                ("q".to_string(), 1, None),
                ("r".to_string(), 2, Some(1)),
            ]
        );
    }

    #[test]
    fn test_orphans_and_unlisted_children() {
        let mapping = json!({
            "x": {"id": "x", "parent": "missing", "children": []},
            "root": {"id": "root", "parent": null, "children": ["ghost"]},
            "late": {"id": "late", "parent": "root", "children": []},
        });
        let seen = collect(&mapping, |_| true);
        let order: Vec<&str> = seen.iter().map(|(id, _, _)| id.as_str()).collect();
        assert_eq!(order, vec!["root", "late", "x"]);
        assert_eq!(seen[1].2, Some(0));
        assert_eq!(seen[2].2, None);
    }

    #[test]
    fn test_parent_positions_never_point_forward() {
        let mapping = json!({
            "n0": {"parent": null, "children": ["n1", "n2"]},
            "n1": {"parent": "n0", "children": ["n3"]},
            "n2": {"parent": "n0", "children": ["n4", "n5"]},
            "n3": {"parent": "n1", "children": []},
            "n4": {"parent": "n2", "children": []},
            "n5": {"parent": "n2", "children": []},
        });
        for (_, position, parent) in collect(&mapping, |id| id != "n2") {
            if let Some(parent) = parent {
                assert!(parent < position);
            }
        }
    }

    #[test]
    fn test_cycles_are_visited_once() {
        let mapping = json!({
            "a": {"parent": "b", "children": ["b"]},
            "b": {"parent": "a", "children": ["a"]},
        });
        let seen = collect(&mapping, |_| true);
        let order: Vec<&str> = seen.iter().map(|(id, _, _)| id.as_str()).collect();
        assert_eq!(order, vec!["a", "b"]);
        assert_eq!(seen[1].2, Some(0));
    }
}
