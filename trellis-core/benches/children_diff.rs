use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use trellis_core::vdom::{MemoryDocument, NodeId, Patcher, VNode};

const ROWS: usize = 1_000;

fn rows(order: impl IntoIterator<Item = usize>) -> VNode<NodeId> {
    VNode::element("tbody")
        .children(order.into_iter().map(|id| {
            VNode::element("tr")
                .key(id)
                .child(VNode::element("td").text(id.to_string()))
        }))
        .build()
}

fn mounted(order: impl IntoIterator<Item = usize>) -> (Patcher<MemoryDocument>, VNode<NodeId>) {
    let patcher = Patcher::new(Rc::new(MemoryDocument::new()));
    let tree = rows(order);
    patcher.patch(None, &tree).expect("initial render");
    (patcher, tree)
}

fn children_diff(c: &mut Criterion) {
    c.bench_function("patch_unchanged_rows", |b| {
        let (patcher, tree) = mounted(0..ROWS);
        b.iter(|| {
            let next = rows(0..ROWS);
            patcher.patch(Some(&tree), black_box(&next)).expect("patch");
        });
    });

    c.bench_function("swap_two_rows", |b| {
        b.iter_batched(
            || {
                let mut order: Vec<usize> = (0..ROWS).collect();
                order.swap(1, ROWS - 2);
                (mounted(0..ROWS), rows(order))
            },
            |((patcher, old), new)| patcher.patch(Some(&old), black_box(&new)).expect("patch"),
            BatchSize::SmallInput,
        );
    });

    c.bench_function("reverse_rows", |b| {
        b.iter_batched(
            || (mounted(0..ROWS), rows((0..ROWS).rev())),
            |((patcher, old), new)| patcher.patch(Some(&old), black_box(&new)).expect("patch"),
            BatchSize::SmallInput,
        );
    });

    c.bench_function("prepend_row", |b| {
        b.iter_batched(
            || (mounted(0..ROWS), rows(std::iter::once(ROWS).chain(0..ROWS))),
            |((patcher, old), new)| patcher.patch(Some(&old), black_box(&new)).expect("patch"),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, children_diff);
criterion_main!(benches);
