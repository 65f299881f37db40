//! Logging-adapter behavior: subscription, append modes, the amortized
//! growth policy and the empty-row sentinel.

use std::rc::Rc;

use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::{
    DatasetOptions, Error, Group, Level, LogSink, Logger, LoggingOptions, LogValue, Vertex,
    DEFAULT_ATTRIBUTES,
};

fn sink(logger: &Logger) -> Rc<dyn LogSink> {
    Rc::new(logger.clone())
}

fn level_column(log: &crate::DatasetLogging) -> Vec<LogValue> {
    log.data().records().unwrap().column("levelname").unwrap()
}

#[test]
fn records_append_in_emission_order() {
    let logger = Logger::new("acquisition");
    let root = Group::root();
    let log = root
        .create_dataset_logging(
            "/log",
            LoggingOptions::new()
                .attributes(["levelname", "message"])
                .sink(sink(&logger)),
        )
        .unwrap();

    logger.info("started").unwrap();
    logger.error("cannot do that!").unwrap();

    // Exactly two rows, in order, and nothing to trim.
    assert_eq!(log.logical_len(), 2);
    assert_eq!(log.len(), 2);
    assert_eq!(
        level_column(&log),
        [
            LogValue::Str("INFO".to_string()),
            LogValue::Str("ERROR".to_string())
        ]
    );
    log.remove_empty_rows().unwrap();
    assert_eq!(log.len(), 2);

    let messages = log.data().records().unwrap().column("message").unwrap();
    assert_eq!(
        messages,
        [
            LogValue::Str("started".to_string()),
            LogValue::Str("cannot do that!".to_string())
        ]
    );
}

#[test]
fn auto_resize_grows_ahead_of_the_cursor() {
    let logger = Logger::new("fast");
    let root = Group::root();
    let log = root
        .create_dataset_logging(
            "/log",
            LoggingOptions::new()
                .attributes(["levelname", "message"])
                .size(2)
                .sink(sink(&logger)),
        )
        .unwrap();
    assert!(log.is_auto_resize());
    assert_eq!(log.len(), 2);
    assert_eq!(log.logical_len(), 0);

    // Five records pushed through an initial size of two.
    for i in 0..5 {
        logger.info(format!("record {i}")).unwrap();
    }
    assert_eq!(log.logical_len(), 5);
    assert!(log.len() >= 5);

    log.remove_empty_rows().unwrap();
    assert_eq!(log.len(), 5);
    assert_eq!(log.logical_len(), 5);
    let messages = log.data().records().unwrap().column("message").unwrap();
    assert_eq!(messages[4], LogValue::Str("record 4".to_string()));
}

#[rstest]
#[case(1, 4)]
#[case(4, 4)]
#[case(5, 8)]
#[case(8, 8)]
#[case(9, 16)]
#[case(16, 16)]
#[case(17, 25)]
fn growth_follows_the_amortized_capacity_sequence(
    #[case] emits: usize,
    #[case] capacity: usize,
) {
    let logger = Logger::new("growth");
    let root = Group::root();
    let log = root
        .create_dataset_logging(
            "/log",
            LoggingOptions::new()
                .attributes(["message"])
                .size(0)
                .sink(sink(&logger)),
        )
        .unwrap();

    let mut capacities = Vec::new();
    for i in 0..emits {
        logger.info(format!("{i}")).unwrap();
        capacities.push(log.len());
    }

    // No row is lost or duplicated, and the physical size is exactly
    // the amortized sequence.
    assert_eq!(log.logical_len(), emits);
    assert_eq!(log.len(), capacity);
    assert!(capacities.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn empty_rows_are_told_apart_from_falsy_rows() {
    let logger = Logger::new("sentinel");
    let root = Group::root();
    let log = root
        .create_dataset_logging(
            "/log",
            LoggingOptions::new()
                .attributes(["message", "levelname"])
                .size(4)
                .sink(sink(&logger)),
        )
        .unwrap();

    // An empty message is a legitimately recorded row.
    logger.info("").unwrap();
    logger.info("real").unwrap();

    log.remove_empty_rows().unwrap();
    assert_eq!(log.len(), 2);
    let messages = log.data().records().unwrap().column("message").unwrap();
    assert_eq!(
        messages,
        [
            LogValue::Str(String::new()),
            LogValue::Str("real".to_string())
        ]
    );
}

#[test]
fn default_attributes_and_date_format() {
    let logger = Logger::new("defaults");
    let root = Group::root();
    let log = root
        .create_dataset_logging("/log", LoggingOptions::new().sink(sink(&logger)))
        .unwrap();
    assert_eq!(log.attributes().to_vec(), DEFAULT_ATTRIBUTES.map(String::from));

    logger.warning("watch out").unwrap();
    let records = log.data().records().unwrap().clone();
    let row = records.row(0).unwrap().to_vec();
    // asctime, levelname, name, message.
    match &row[0] {
        LogValue::Str(asctime) => {
            // ISO-8601-like with microseconds: 2026-08-07T12:34:56.789012
            assert_eq!(asctime.len(), 26);
            assert_eq!(&asctime[4..5], "-");
            assert_eq!(&asctime[10..11], "T");
            assert_eq!(&asctime[19..20], ".");
        }
        other => panic!("expected a formatted timestamp, got {other:?}"),
    }
    assert_eq!(row[1], LogValue::Str("WARNING".to_string()));
    assert_eq!(row[2], LogValue::Str("defaults".to_string()));
    assert_eq!(row[3], LogValue::Str("watch out".to_string()));
}

#[test]
fn attribute_lists_are_validated() {
    let root = Group::root();
    assert!(matches!(
        root.create_dataset_logging(
            "/log",
            LoggingOptions::new().attributes(Vec::<String>::new())
        ),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        root.create_dataset_logging("/bad", LoggingOptions::new().attributes(["lineno"])),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn set_logger_raises_a_coarser_sink_level() {
    let root = Group::root();
    let log = root
        .create_dataset_logging("/log", LoggingOptions::new().level(Level::Info))
        .unwrap();

    // Unset level is raised to the adapter's.
    let unset = Logger::new("unset");
    log.set_logger(sink(&unset));
    assert_eq!(unset.level(), Level::Info);

    // A coarser level is raised too.
    let coarse = Logger::new("coarse");
    coarse.set_level(Level::Error);
    log.set_logger(sink(&coarse));
    assert_eq!(coarse.level(), Level::Info);

    // A finer level is left alone.
    let fine = Logger::new("fine");
    fine.set_level(Level::Debug);
    log.set_logger(sink(&fine));
    assert_eq!(fine.level(), Level::Debug);
}

#[test]
fn set_logger_moves_the_subscription() {
    let first = Logger::new("first");
    let second = Logger::new("second");
    let root = Group::root();
    let log = root
        .create_dataset_logging(
            "/log",
            LoggingOptions::new()
                .attributes(["message"])
                .sink(sink(&first)),
        )
        .unwrap();

    first.info("one").unwrap();
    log.set_logger(sink(&second));
    first.info("lost").unwrap();
    second.info("two").unwrap();

    let messages = log.data().records().unwrap().column("message").unwrap();
    assert_eq!(
        messages,
        [
            LogValue::Str("one".to_string()),
            LogValue::Str("two".to_string())
        ]
    );
}

#[test]
fn remove_handler_detaches_from_the_sink_only() {
    let logger = Logger::new("detach");
    let root = Group::root();
    let log = root
        .create_dataset_logging(
            "/log",
            LoggingOptions::new()
                .attributes(["message"])
                .sink(sink(&logger)),
        )
        .unwrap();

    logger.info("kept").unwrap();
    log.remove_handler();
    logger.info("dropped").unwrap();

    assert_eq!(log.logical_len(), 1);
    // The dataset itself stays in the tree.
    assert!(root.contains("/log"));

    // Detaching twice is a no-op, as is detaching a never-attached log.
    log.remove_handler();
    let lonely = root
        .create_dataset_logging("/lonely", LoggingOptions::new())
        .unwrap();
    lonely.remove_handler();
}

#[test]
fn adapters_compare_by_identity_only() {
    let logger = Logger::new("shared");
    let root = Group::root();
    let one = root
        .create_dataset_logging(
            "/one",
            LoggingOptions::new()
                .attributes(["message"])
                .sink(sink(&logger)),
        )
        .unwrap();
    let two = root
        .create_dataset_logging(
            "/two",
            LoggingOptions::new()
                .attributes(["message"])
                .sink(sink(&logger)),
        )
        .unwrap();

    // Both empty logs subscribe independently; membership tests must
    // not conflate them.
    assert!(!one.ptr_eq(&two));
    logger.info("both").unwrap();
    assert_eq!(one.logical_len(), 1);
    assert_eq!(two.logical_len(), 1);
}

#[test]
fn adapter_level_filters_records() {
    let logger = Logger::new("filter");
    let root = Group::root();
    let log = root
        .create_dataset_logging(
            "/log",
            LoggingOptions::new()
                .attributes(["levelname"])
                .level(Level::Error)
                .sink(sink(&logger)),
        )
        .unwrap();

    logger.info("ignored").unwrap();
    logger.critical("kept").unwrap();
    assert_eq!(level_column(&log), [LogValue::Str("CRITICAL".to_string())]);
}

#[test]
fn frozen_logs_reject_records() {
    let logger = Logger::new("frozen");
    let root = Group::root();
    let log = root
        .create_dataset_logging(
            "/log",
            LoggingOptions::new()
                .attributes(["message"])
                .sink(sink(&logger)),
        )
        .unwrap();

    log.set_read_only(true);
    assert!(matches!(logger.info("refused"), Err(Error::ReadOnly(_))));
    log.set_read_only(false);
    logger.info("accepted").unwrap();
    assert_eq!(log.logical_len(), 1);
}

#[test]
fn marker_metadata_identifies_logging_datasets() {
    let root = Group::root();
    let log = root
        .create_dataset_logging("/log", LoggingOptions::new().level(Level::Warning))
        .unwrap();
    let meta = log.metadata();
    assert_eq!(meta.get("logging_level").and_then(|v| v.as_int()), Some(30));
    assert_eq!(
        meta.get("logging_level_name").and_then(|v| v.as_str().map(String::from)),
        Some("WARNING".to_string())
    );
    assert!(meta.contains_key("logging_date_format"));
}

#[test]
fn require_dataset_logging_is_idempotent() {
    let root = Group::root();
    let log = root
        .create_dataset_logging("/log", LoggingOptions::new().attributes(["message"]))
        .unwrap();

    let again = root
        .require_dataset_logging("/log", LoggingOptions::new().attributes(["message"]))
        .unwrap();
    assert!(again.vertex_eq(&log));

    assert!(matches!(
        root.require_dataset_logging("/log", LoggingOptions::new().attributes(["levelname"])),
        Err(Error::InvalidArgument(_))
    ));

    // A plain dataset without the logging markers does not qualify.
    root.create_dataset("/plain", DatasetOptions::new()).unwrap();
    assert!(matches!(
        root.require_dataset_logging("/plain", LoggingOptions::new()),
        Err(Error::InvalidArgument(_))
    ));

    let fresh = root
        .require_dataset_logging("/fresh", LoggingOptions::new())
        .unwrap();
    assert!(root.contains("/fresh"));
    assert_eq!(fresh.logical_len(), 0);
}

#[test]
fn require_dataset_logging_rebuilds_a_copied_log() {
    let logger = Logger::new("rebuild");
    let source = Group::root();
    let original = source
        .create_dataset_logging(
            "/log",
            LoggingOptions::new()
                .attributes(["message"])
                .sink(sink(&logger)),
        )
        .unwrap();
    logger.info("carried over").unwrap();

    // A deep tree copy turns the log into a plain dataset with the
    // marker metadata; requiring it restores the logging behavior.
    let root = Group::root();
    root.add_group("/copied", &source).unwrap();
    let node = root.get("/copied/log").unwrap();
    assert!(node.is_dataset() && !node.is_dataset_logging());

    let copied = root.group("/copied").unwrap();
    let restored = copied
        .require_dataset_logging("/log", LoggingOptions::new())
        .unwrap();
    assert_eq!(restored.logical_len(), 1);
    assert_eq!(
        restored.data().records().unwrap().column("message").unwrap(),
        [LogValue::Str("carried over".to_string())]
    );
    assert!(root.get("/copied/log").unwrap().is_dataset_logging());
    drop(original);
}

#[test]
fn copied_logging_datasets_keep_their_subscription() {
    let logger = Logger::new("copied");
    let root = Group::root();
    let log = root
        .create_dataset_logging(
            "/log",
            LoggingOptions::new()
                .attributes(["message"])
                .sink(sink(&logger)),
        )
        .unwrap();
    logger.info("before").unwrap();

    let copy = root.add_dataset_logging("/copy", &log).unwrap();
    logger.info("after").unwrap();

    // The original has both records, the copy was subscribed in time
    // for the second one plus the carried-over row.
    assert_eq!(log.logical_len(), 2);
    assert_eq!(copy.logical_len(), 2);
    assert_eq!(
        copy.data().records().unwrap().column("message").unwrap(),
        [
            LogValue::Str("before".to_string()),
            LogValue::Str("after".to_string())
        ]
    );
}

#[test]
fn dropped_logs_fall_out_of_the_sink() {
    let logger = Logger::new("weak");
    let root = Group::root();
    let log = root
        .create_dataset_logging(
            "/log",
            LoggingOptions::new()
                .attributes(["message"])
                .sink(sink(&logger)),
        )
        .unwrap();

    root.remove("/log").unwrap();
    drop(log);
    // The subscription was weak; dispatch simply skips the dead entry.
    logger.info("nobody listens").unwrap();
}
