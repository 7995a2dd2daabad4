//! Syntactic reference-chain extraction (spec §4.2): scans an unresolved
//! mapping-node tree for `${resources.<name>...}` / `${children.<name>...}`
//! substitution expressions without evaluating them, so the dependency
//! analyser can learn which other elements a resource's (or include's) spec
//! mentions even though none of it has been resolved yet.
//!
//! This is deliberately separate from [`crate::substitution::SubstitutionResolver`]:
//! that trait is interface-only and never parses `${...}` itself, but a
//! reference chain only needs the raw token shape, not the resolver's
//! semantics, so a generic scan over the spec tree is enough.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::mapping::MappingNode;

static REFERENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{\s*(resources|children)\.([a-zA-Z_][a-zA-Z0-9_]*)").unwrap());

/// The resource and child logical names one mapping-node tree's reference
/// chain mentions (spec §4.2: "R's reference chain contains `resources.S`").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceChain {
    pub resources: BTreeSet<String>,
    pub children: BTreeSet<String>,
}

/// Walks every string leaf in `node`, collecting the `resources.*` /
/// `children.*` names any `${...}` expression mentions.
pub fn collect_references(node: &MappingNode) -> ReferenceChain {
    let mut chain = ReferenceChain::default();
    collect_into(node, &mut chain);
    chain
}

fn collect_into(node: &MappingNode, chain: &mut ReferenceChain) {
    match node {
        MappingNode::String(s) => {
            for captures in REFERENCE_REGEX.captures_iter(s) {
                let name = captures[2].to_string();
                match &captures[1] {
                    "resources" => {
                        chain.resources.insert(name);
                    }
                    "children" => {
                        chain.children.insert(name);
                    }
                    _ => unreachable!("regex only captures resources|children"),
                }
            }
        }
        MappingNode::Object(m) => {
            for v in m.values() {
                collect_into(v, chain);
            }
        }
        MappingNode::Array(a) => {
            for v in a {
                collect_into(v, chain);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn collects_resource_and_child_references() {
        let node = MappingNode::Object(BTreeMap::from([
            (
                "connectionString".to_string(),
                MappingNode::String("${resources.ordersDb.endpoint}".into()),
            ),
            (
                "region".to_string(),
                MappingNode::String("${children.networking.vpcRegion}".into()),
            ),
            ("plain".to_string(), MappingNode::String("no reference here".into())),
        ]));
        let chain = collect_references(&node);
        assert_eq!(chain.resources, BTreeSet::from(["ordersDb".to_string()]));
        assert_eq!(chain.children, BTreeSet::from(["networking".to_string()]));
    }

    #[test]
    fn collects_references_nested_in_arrays() {
        let node = MappingNode::Array(vec![
            MappingNode::String("${resources.a}".into()),
            MappingNode::Object(BTreeMap::from([(
                "nested".to_string(),
                MappingNode::String("${resources.b.id} and ${children.c}".into()),
            )])),
        ]);
        let chain = collect_references(&node);
        assert_eq!(
            chain.resources,
            BTreeSet::from(["a".to_string(), "b".to_string()])
        );
        assert_eq!(chain.children, BTreeSet::from(["c".to_string()]));
    }

    #[test]
    fn non_reference_strings_yield_empty_chain() {
        let chain = collect_references(&MappingNode::String("nodejs20.x".into()));
        assert!(chain.resources.is_empty());
        assert!(chain.children.is_empty());
    }
}
