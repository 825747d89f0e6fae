//! Splits a resolved plan into executable fragments at `Send`/`Receive`
//! boundaries.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::trace;

use crate::error::{PlannerError, Result};
use crate::ids::{FragmentId, PlanNodeId};
use crate::plan::{PlanNode, PlanNodeKind};

/// Where a fragment executes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum FragmentSite {
    /// Coordinator of a multi-partition plan.
    Coordinator,
    /// The one partition a single-partition plan runs on.
    SinglePartition,
    /// Every partition; outputs are concatenated for the consumer.
    AllPartitions,
}

/// One executable piece of a plan, rooted at a `Send`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Fragment {
    /// Fragment id; the root fragment is 0.
    pub id: FragmentId,
    /// Execution site.
    pub site: FragmentSite,
    /// Fragment root. Cut `Receive` nodes have no children here.
    pub root: PlanNode,
    /// Tables the fragment scans or modifies.
    pub tables: Vec<String>,
}

/// Producer to consumer link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FragmentEdge {
    /// Fragment whose root `Send` ships rows.
    pub producer: FragmentId,
    /// Fragment holding the `Receive`.
    pub consumer: FragmentId,
    /// Consuming `Receive` node.
    pub receive: PlanNodeId,
    /// Producer's root `Send` node.
    pub send: PlanNodeId,
}

/// Fragments of one plan and the edges between them.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FragmentGraph {
    fragments: Vec<Fragment>,
    edges: Vec<FragmentEdge>,
}

impl FragmentGraph {
    /// Fragments by id.
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Producer to consumer edges.
    pub fn edges(&self) -> &[FragmentEdge] {
        &self.edges
    }

    /// Fragment containing the plan root.
    pub fn root_fragment(&self) -> Option<&Fragment> {
        self.fragments.first()
    }

    /// Fragment by id.
    pub fn fragment(&self, id: FragmentId) -> Option<&Fragment> {
        self.fragments.iter().find(|f| f.id == id)
    }

    /// Edge feeding the given `Receive`.
    pub fn edge_into(&self, receive: PlanNodeId) -> Option<&FragmentEdge> {
        self.edges.iter().find(|e| e.receive == receive)
    }

    /// Number of fragments.
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// True when the graph holds no fragment.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Fragment ids with every producer before its consumer; the root
    /// fragment is last.
    pub fn dependency_order(&self) -> Vec<FragmentId> {
        let mut order = Vec::with_capacity(self.fragments.len());
        if let Some(root) = self.root_fragment() {
            self.post_order(root.id, &mut order);
        }
        order
    }

    fn post_order(&self, id: FragmentId, out: &mut Vec<FragmentId>) {
        for edge in self.edges.iter().filter(|e| e.consumer == id) {
            self.post_order(edge.producer, out);
        }
        if !out.contains(&id) {
            out.push(id);
        }
    }

    /// Rebuilds the unfragmented plan.
    pub fn reassemble(&self) -> Option<PlanNode> {
        let mut root = self.root_fragment()?.root.clone();
        self.attach(&mut root);
        Some(root)
    }

    fn attach(&self, node: &mut PlanNode) {
        if matches!(node.kind, PlanNodeKind::Receive) && node.children.is_empty() {
            if let Some(producer) = self.edge_into(node.id).and_then(|e| self.fragment(e.producer)) {
                node.children.push(producer.root.clone());
            }
        }
        for child in &mut node.children {
            self.attach(child);
        }
    }
}

/// Cuts resolved plans into fragment graphs.
#[derive(Clone, Copy, Debug, Default)]
pub struct Fragmentizer;

impl Fragmentizer {
    /// Splits `root` at every `Receive`. The root must be a `Send`; every
    /// `Receive` must have exactly one child, a `Send`; no other `Send` may
    /// appear.
    pub fn fragmentize(&self, root: &PlanNode, single_partition: bool) -> Result<FragmentGraph> {
        if !matches!(root.kind, PlanNodeKind::Send) {
            return Err(PlannerError::internal(format!(
                "plan root {} is {}, not SEND",
                root.id,
                root.op_name()
            )));
        }
        let mut builder = Builder::default();
        let root_id = builder.allocate();
        let mut root = root.clone();
        builder.cut_below(&mut root, root_id)?;
        let site = if single_partition {
            FragmentSite::SinglePartition
        } else {
            FragmentSite::Coordinator
        };
        builder.fragments.push(Fragment {
            id: root_id,
            site,
            tables: tables_of(&root),
            root,
        });
        builder.fragments.sort_by_key(|f| f.id);
        trace!(
            fragments = builder.fragments.len(),
            edges = builder.edges.len(),
            "fragment.graph.built"
        );
        Ok(FragmentGraph {
            fragments: builder.fragments,
            edges: builder.edges,
        })
    }
}

#[derive(Default)]
struct Builder {
    next: u32,
    fragments: Vec<Fragment>,
    edges: Vec<FragmentEdge>,
}

impl Builder {
    fn allocate(&mut self) -> FragmentId {
        let id = FragmentId(self.next);
        self.next += 1;
        id
    }

    fn cut_below(&mut self, node: &mut PlanNode, consumer: FragmentId) -> Result<()> {
        for child in &mut node.children {
            if matches!(child.kind, PlanNodeKind::Send) {
                return Err(PlannerError::internal(format!(
                    "SEND node {} is not below a RECEIVE",
                    child.id
                )));
            }
            if !matches!(child.kind, PlanNodeKind::Receive) {
                self.cut_below(child, consumer)?;
                continue;
            }
            let single_send =
                child.children.len() == 1 && matches!(child.children[0].kind, PlanNodeKind::Send);
            let send = match child.children.pop() {
                Some(send) if single_send => send,
                _ => {
                    return Err(PlannerError::internal(format!(
                        "RECEIVE node {} needs exactly one SEND input",
                        child.id
                    )))
                }
            };
            let mut send = send;
            let producer = self.allocate();
            self.cut_below(&mut send, producer)?;
            self.edges.push(FragmentEdge {
                producer,
                consumer,
                receive: child.id,
                send: send.id,
            });
            self.fragments.push(Fragment {
                id: producer,
                site: FragmentSite::AllPartitions,
                tables: tables_of(&send),
                root: send,
            });
        }
        Ok(())
    }
}

fn tables_of(root: &PlanNode) -> Vec<String> {
    let mut tables = BTreeSet::new();
    root.walk(&mut |n| match &n.kind {
        PlanNodeKind::SeqScan { table, .. }
        | PlanNodeKind::IndexScan { table, .. }
        | PlanNodeKind::Insert { table, .. }
        | PlanNodeKind::Update { table, .. }
        | PlanNodeKind::Delete { table } => {
            tables.insert(table.clone());
        }
        _ => {}
    });
    tables.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::PlanNodeIdAllocator;

    fn scan(ids: &mut PlanNodeIdAllocator) -> PlanNode {
        PlanNode::leaf(
            ids,
            PlanNodeKind::SeqScan {
                table: "T".into(),
                alias: "T".into(),
                predicate: None,
            },
        )
    }

    fn multi_partition_plan() -> PlanNode {
        let mut ids = PlanNodeIdAllocator::new();
        let leaf = scan(&mut ids);
        let inner_send = PlanNode::unary(&mut ids, PlanNodeKind::Send, leaf);
        let receive = PlanNode::unary(&mut ids, PlanNodeKind::Receive, inner_send);
        let distinct = PlanNode::unary(&mut ids, PlanNodeKind::Distinct, receive);
        let mut root = PlanNode::unary(&mut ids, PlanNodeKind::Send, distinct);
        root.renumber(&mut PlanNodeIdAllocator::new());
        root
    }

    #[test]
    fn receive_cuts_producer_fragment() {
        let plan = multi_partition_plan();
        let graph = Fragmentizer.fragmentize(&plan, false).expect("fragments");
        assert_eq!(graph.len(), 2);
        let root = graph.root_fragment().expect("root");
        assert_eq!(root.site, FragmentSite::Coordinator);
        assert_eq!(root.root.shape(), "SEND(DISTINCT(RECEIVE))");
        assert!(root.tables.is_empty());
        let producer = graph.fragment(FragmentId(1)).expect("producer");
        assert_eq!(producer.site, FragmentSite::AllPartitions);
        assert_eq!(producer.tables, ["T"]);
        assert_eq!(graph.dependency_order(), [FragmentId(1), FragmentId(0)]);
        assert_eq!(graph.reassemble(), Some(plan));
    }

    #[test]
    fn single_partition_plan_is_one_fragment() {
        let mut ids = PlanNodeIdAllocator::new();
        let leaf = scan(&mut ids);
        let root = PlanNode::unary(&mut ids, PlanNodeKind::Send, leaf);
        let graph = Fragmentizer.fragmentize(&root, true).expect("fragments");
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.fragments()[0].site, FragmentSite::SinglePartition);
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn malformed_boundaries_are_internal_errors() {
        let mut ids = PlanNodeIdAllocator::new();
        let leaf = scan(&mut ids);
        let stray = PlanNode::unary(&mut ids, PlanNodeKind::Send, leaf);
        let root = PlanNode::unary(&mut ids, PlanNodeKind::Send, stray);
        let err = Fragmentizer.fragmentize(&root, false).expect_err("stray send");
        assert_eq!(err.code(), "Internal");

        let leaf = scan(&mut ids);
        let bare_receive = PlanNode::unary(&mut ids, PlanNodeKind::Receive, leaf);
        let root = PlanNode::unary(&mut ids, PlanNodeKind::Send, bare_receive);
        assert!(Fragmentizer.fragmentize(&root, false).is_err());

        assert!(Fragmentizer.fragmentize(&scan(&mut ids), true).is_err());
    }
}
