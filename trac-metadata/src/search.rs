use serde::{Deserialize, Serialize};
use trac_types::{BasicType, Value};

/// Comparison operators a search leaf term may use (spec.md §4.2.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Exists,
}

/// One leaf term: `{attrName, attrType, op, value(s)}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeafTerm {
    pub attr_name: String,
    pub attr_type: BasicType,
    pub op: Op,
    pub values: Vec<Value>,
}

/// The query tree: leaves combined by `AND`/`OR`/`NOT` (spec.md §4.2.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QueryNode {
    Leaf(LeafTerm),
    And(Vec<QueryNode>),
    Or(Vec<QueryNode>),
    Not(Box<QueryNode>),
}

/// `search(tenant, params)` input. By default resolves only rows with
/// `isLatestObject AND isLatestTag`; the `prior_*` flags broaden scope
/// (spec.md §4.2.4).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchParams {
    pub query: Option<QueryNode>,
    pub prior_versions: bool,
    pub prior_tags: bool,
    pub limit: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_scope_to_latest_only() {
        let params = SearchParams::default();
        assert!(!params.prior_versions);
        assert!(!params.prior_tags);
        assert!(params.query.is_none());
    }

    #[test]
    fn query_tree_composes_leaves() {
        let leaf = QueryNode::Leaf(LeafTerm {
            attr_name: "owner".into(),
            attr_type: BasicType::String,
            op: Op::Eq,
            values: vec![Value::String("alice".into())],
        });
        let tree = QueryNode::Not(Box::new(QueryNode::And(vec![leaf])));
        match tree {
            QueryNode::Not(inner) => assert!(matches!(*inner, QueryNode::And(_))),
            _ => panic!("expected Not node"),
        }
    }
}
