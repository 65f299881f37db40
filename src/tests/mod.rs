//! Cross-module scenario tests for the tree engine, the dataset
//! wrapper and the logging adapter.

mod dataset_logging;

use crate::{Group, Vertex};

#[test]
fn a_small_acquisition_tree_end_to_end() {
    let root = Group::root();
    root.add_metadata([("facility", "photometry lab")]).unwrap();

    let run = root.create_group("/runs/2026-08-07").unwrap();
    run.add_metadata([("operator", "kp")]).unwrap();

    let dataset = root
        .create_dataset(
            "/runs/2026-08-07/voltages",
            crate::DatasetOptions::new()
                .data(vec![1.0, 2.0, 4.0])
                .metadata("unit", "V"),
        )
        .unwrap();

    // The whole chain is addressable from the root and from the run.
    assert!(root.contains("/runs/2026-08-07/voltages"));
    assert!(run.contains("/voltages"));
    assert_eq!(dataset.len(), 3);

    // Freezing the root freezes everything below it.
    root.set_read_only(true);
    assert!(dataset.set(&[0], 0.0).is_err());
    assert!(run.create_group("more").is_err());

    root.set_read_only(false);
    dataset.set(&[0], 0.5).unwrap();
}

#[test]
fn tree_rendering_lists_every_node_indented() {
    let root = Group::root();
    root.create_dataset("/a/x", crate::DatasetOptions::new())
        .unwrap();
    root.create_group("/b").unwrap();

    let rendered = root.tree(2);
    let lines: Vec<&str> = rendered.lines().collect();
    // Root plus /a, /a/x and /b.
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("<Group \"/\""));
    assert!(lines[2].starts_with("    <Dataset"));
}
