//! Mapper -> shuffle -> reducer runs over small graphs.

mod test_data_gen;

use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;

use flowstack_core::id::NodeId;
use flowstack_core::schema::{Fields, Selector};
use flowstack_core::tuple;
use flowstack_core::types::{Tuple, Value};
use flowstack_exec::{LocalShuffle, MapperStack, ReducerStack};
use flowstack_io::{LineSplitSource, MultiSplitReader};
use flowstack_operators::{Joiner, NodeKind, OutputMode, StepGraph, TransformOp};
use test_data_gen::{memory_context, CsvLines, InnerJoin, LeftJoin, MemorySink, ParseCount, SumI64};

fn source() -> NodeKind {
    NodeKind::Source {
        source: Arc::new(CsvLines),
    }
}

fn sink(out: &MemorySink) -> NodeKind {
    NodeKind::Sink {
        sink: Arc::new(out.clone()),
    }
}

struct JoinGraph {
    graph: StepGraph,
    lhs: NodeId,
    rhs: NodeId,
    group: NodeId,
}

/// lhs and rhs sources co-grouped on `k`, joined straight into `out`.
fn two_way_join(joiner: Arc<dyn Joiner>, out: &MemorySink) -> JoinGraph {
    let mut graph = StepGraph::new();
    let lhs = graph.add_node("lhs", source());
    let rhs = graph.add_node("rhs", source());
    let group = graph.add_node(
        "join",
        NodeKind::GroupBoundary {
            key_fields: vec![Fields::new(["k"]), Fields::new(["k"])],
            num_self_joins: 0,
            joiner: Some(joiner),
        },
    );
    let out = graph.add_node("out", sink(out));
    graph.connect(lhs, group, Fields::new(["k", "l"]));
    graph.connect(rhs, group, Fields::new(["k", "r"]));
    graph.connect(group, out, Fields::new(["k", "l", "k2", "r"]));
    JoinGraph {
        graph,
        lhs,
        rhs,
        group,
    }
}

fn map_lines(
    graph: &StepGraph,
    source: NodeId,
    shuffle: &Arc<LocalShuffle>,
    lines: &[&str],
) {
    let (ctx, _) = memory_context(100);
    let mut mapper = MapperStack::build(&ctx, graph, source, Some(shuffle.clone())).unwrap();
    for (i, line) in lines.iter().enumerate() {
        mapper.map(Value::I64(i as i64), Value::from(*line)).unwrap();
    }
    mapper.close().unwrap();
}

fn pairs(rows: &[Tuple], left: usize, right: usize) -> BTreeSet<(String, String)> {
    rows.iter()
        .map(|t| {
            let l = t.get(left).and_then(Value::as_str).unwrap_or("null");
            let r = t.get(right).and_then(Value::as_str).unwrap_or("null");
            (l.to_string(), r.to_string())
        })
        .collect()
}

fn set(items: &[(&str, &str)]) -> BTreeSet<(String, String)> {
    items
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect()
}

#[test]
fn test_two_way_inner_join() {
    let out = MemorySink::default();
    let g = two_way_join(Arc::new(InnerJoin), &out);
    let shuffle = Arc::new(LocalShuffle::new());

    map_lines(&g.graph, g.lhs, &shuffle, &["K1,a", "K1,b"]);
    map_lines(&g.graph, g.rhs, &shuffle, &["K1,x"]);

    let (ctx, _) = memory_context(100);
    let mut reducer = ReducerStack::build(&ctx, &g.graph, g.group).unwrap();
    assert_eq!(reducer.reduce_all(shuffle.drain_groups().unwrap()).unwrap(), 1);
    reducer.close().unwrap();

    assert_eq!(pairs(&out.written(), 1, 3), set(&[("a", "x"), ("b", "x")]));
    assert_eq!(out.opens_and_closes(), (1, 1));
}

#[test]
fn test_self_join() {
    let out = MemorySink::default();
    let mut graph = StepGraph::new();
    let src = graph.add_node("input", source());
    let group = graph.add_node(
        "self",
        NodeKind::GroupBoundary {
            key_fields: vec![Fields::new(["k"])],
            num_self_joins: 1,
            joiner: Some(Arc::new(InnerJoin)),
        },
    );
    let sink_id = graph.add_node("out", sink(&out));
    graph.connect(src, group, Fields::new(["k", "v"]));
    graph.connect(group, sink_id, Fields::new(["k", "v", "k2", "v2"]));

    let shuffle = Arc::new(LocalShuffle::new());
    map_lines(&graph, src, &shuffle, &["K1,p", "K1,q"]);

    let (ctx, _) = memory_context(100);
    let mut reducer = ReducerStack::build(&ctx, &graph, group).unwrap();
    reducer.reduce_all(shuffle.drain_groups().unwrap()).unwrap();
    reducer.close().unwrap();

    assert_eq!(
        pairs(&out.written(), 1, 3),
        set(&[("p", "p"), ("p", "q"), ("q", "p"), ("q", "q")])
    );
}

#[test]
fn test_spilling_reducer_matches_in_memory_result() {
    let lhs_lines = ["K1,a"];
    let rhs_lines: Vec<String> = (0..5).map(|i| format!("K1,r{i}")).collect();
    let rhs_refs: Vec<&str> = rhs_lines.iter().map(String::as_str).collect();

    let out = MemorySink::default();
    let g = two_way_join(Arc::new(InnerJoin), &out);
    let shuffle = Arc::new(LocalShuffle::new());
    map_lines(&g.graph, g.lhs, &shuffle, &lhs_lines);
    map_lines(&g.graph, g.rhs, &shuffle, &rhs_refs);

    let (ctx, storage) = memory_context(1);
    let mut reducer = ReducerStack::build(&ctx, &g.graph, g.group).unwrap();
    reducer.reduce_all(shuffle.drain_groups().unwrap()).unwrap();
    reducer.close().unwrap();

    let right: Vec<String> = out
        .written()
        .iter()
        .map(|t| t.get(3).and_then(Value::as_str).unwrap_or("").to_string())
        .collect();
    assert_eq!(right, rhs_lines.iter().map(|l| l[3..].to_string()).collect::<Vec<_>>());

    let snap = reducer.snapshot();
    assert!(snap.spill.spills_written >= 4);
    assert_eq!(snap.spill.tuples_spilled, 5);
    assert_eq!(snap.groups_reduced, 1);

    let json: serde_json::Value = serde_json::from_str(&snap.to_json().unwrap()).unwrap();
    assert_eq!(json["spill"]["tuples_spilled"], 5);
    assert_eq!(json["groups_reduced"], 1);

    drop(reducer);
    assert!(storage.is_empty());
}

#[test]
fn test_left_join_pads_missing_right_side() {
    let out = MemorySink::default();
    let g = two_way_join(Arc::new(LeftJoin { right_arity: 2 }), &out);
    let shuffle = Arc::new(LocalShuffle::new());

    map_lines(&g.graph, g.lhs, &shuffle, &["K1,a", "K2,b"]);
    map_lines(&g.graph, g.rhs, &shuffle, &["K1,x"]);

    let (ctx, _) = memory_context(100);
    let mut reducer = ReducerStack::build(&ctx, &g.graph, g.group).unwrap();
    assert_eq!(reducer.reduce_all(shuffle.drain_groups().unwrap()).unwrap(), 2);
    reducer.close().unwrap();

    assert_eq!(
        out.written(),
        vec![
            tuple!["K1", "a", "K1", "x"],
            Tuple::concat([&tuple!["K2", "b"], &Tuple::nulls(2)]),
        ]
    );
}

#[test]
fn test_word_count_over_line_splits() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("part-00000"), "apple,2\npear,1\n\nbroken,x\n").unwrap();
    fs::write(dir.path().join("part-00001"), "apple,3\n").unwrap();

    let out = MemorySink::default();
    let bad = MemorySink::default();
    let mut graph = StepGraph::new();
    let src = graph.add_node("lines", source());
    let parse = graph.add_node(
        "parse",
        NodeKind::Transform {
            op: TransformOp::Function(Arc::new(ParseCount)),
            arguments: Selector::All,
            output: OutputMode::Results,
        },
    );
    let group = graph.add_node(
        "by-word",
        NodeKind::GroupBoundary {
            key_fields: vec![Fields::new(["word"])],
            num_self_joins: 0,
            joiner: None,
        },
    );
    let sum = graph.add_node(
        "sum",
        NodeKind::Aggregate {
            aggregator: Arc::new(SumI64),
            arguments: Selector::Fields(Fields::new(["n"])),
        },
    );
    let sink_id = graph.add_node("totals", sink(&out));
    graph.connect(src, parse, Fields::new(["word", "count"]));
    graph.connect(parse, group, Fields::new(["word", "n"]));
    graph.connect(group, sum, Fields::new(["word", "n"]));
    graph.connect(sum, sink_id, Fields::new(["word", "total"]));
    graph.set_trap("parse", Arc::new(bad.clone()));

    let shuffle = Arc::new(LocalShuffle::new());
    let (ctx, _) = memory_context(100);
    let mut mapper = MapperStack::build(&ctx, &graph, src, Some(shuffle.clone())).unwrap();
    let mut splits = MultiSplitReader::new(LineSplitSource::from_dir(dir.path()).unwrap()).unwrap();
    assert_eq!(mapper.run_splits(&mut splits).unwrap(), 5);
    mapper.close().unwrap();

    let snap = mapper.snapshot();
    assert_eq!(snap.records_read, 5);
    assert_eq!(snap.records_skipped, 1);
    assert_eq!(snap.diverted, 1);
    assert_eq!(bad.diverted()[0].0, tuple!["broken", "x"]);

    let (ctx, _) = memory_context(100);
    let mut reducer = ReducerStack::build(&ctx, &graph, group).unwrap();
    reducer.reduce_all(shuffle.drain_groups().unwrap()).unwrap();
    reducer.close().unwrap();

    assert_eq!(
        out.written(),
        vec![tuple!["apple", 5_i64], tuple!["pear", 1_i64]]
    );
}
