//! Flattening a parented list collection into a stable, addressable
//! pre-order sequence with dotted breadcrumb positions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::SystemListType;

/// One raw row of a user's list hierarchy, as fetched from storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRow {
    pub list_id: i64,
    pub title: String,
    pub parent_list_id: Option<i64>,
    pub system_type: SystemListType,
    /// Sibling index, scoped to (user, parent). Contiguous from 1;
    /// 0 is the reserved sentinel and never reaches the encoder.
    pub position: i64,
}

/// An addressable entry of the flattened hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionedList {
    pub list_id: i64,
    pub title: String,
    /// Dotted breadcrumb like `"3.1."`: the path of sibling indices from
    /// the forest root, including segments of hidden ancestors.
    pub position: String,
}

/// Flatten `rows` into pre-order, assigning each visible node its dotted
/// position.
///
/// Hidden nodes (per `is_hidden`) are not emitted but still contribute
/// their numeric segment, so descendants keep stable addresses when a
/// system list is hidden from a menu. The parent graph is acyclic by
/// construction (self-referencing foreign key); nodes whose parent is
/// missing from `rows` are unreachable and silently dropped.
pub fn encode_positions<F>(rows: &[ListRow], is_hidden: F) -> Vec<PositionedList>
where
    F: Fn(&ListRow) -> bool,
{
    if rows.is_empty() {
        return Vec::new();
    }

    let mut children: HashMap<Option<i64>, Vec<&ListRow>> = HashMap::new();
    for row in rows {
        children.entry(row.parent_list_id).or_default().push(row);
    }
    for siblings in children.values_mut() {
        siblings.sort_by_key(|row| row.position);
    }

    // Explicit stack instead of recursion: pathological nesting depth
    // must not overflow the call stack. Children are pushed in reverse
    // so the pop order is pre-order.
    let mut ordered = Vec::with_capacity(rows.len());
    let mut stack: Vec<(&ListRow, String)> = Vec::new();
    if let Some(roots) = children.get(&None) {
        for root in roots.iter().rev() {
            stack.push((root, String::new()));
        }
    }

    while let Some((row, prefix)) = stack.pop() {
        let position = format!("{}{}.", prefix, row.position);
        if !is_hidden(row) {
            ordered.push(PositionedList {
                list_id: row.list_id,
                title: row.title.clone(),
                position: position.clone(),
            });
        }
        if let Some(kids) = children.get(&Some(row.list_id)) {
            for kid in kids.iter().rev() {
                stack.push((kid, position.clone()));
            }
        }
    }

    ordered
}
