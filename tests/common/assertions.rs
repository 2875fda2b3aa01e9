//! Custom assertion macros
//!
//! Shorter failure output for the checks the suites repeat most.

/// Assert that a result is ok and return the value
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($result:expr, $message:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("{}: {:?}", $message, e),
        }
    };
}

/// Assert that a result is an error, optionally of a given shape
#[macro_export]
macro_rules! assert_err {
    ($result:expr) => {
        assert!($result.is_err(), "Expected Err, got Ok");
    };
    ($result:expr, $pattern:pat) => {
        match $result {
            Err($pattern) => {}
            Ok(value) => panic!("Expected Err, got Ok: {:?}", value),
            Err(e) => panic!("Expected different error variant, got: {:?}", e),
        }
    };
}

/// Assert the ids of a list of entities, in order
#[macro_export]
macro_rules! assert_ids {
    ($entities:expr, $expected:expr) => {
        let actual: Vec<String> = $entities.iter().map(|e| e.id.clone()).collect();
        let expected: Vec<String> = $expected.iter().map(|id| id.to_string()).collect();
        pretty_assertions::assert_eq!(actual, expected);
    };
}

/// Assert that a sync outcome completed and return its report
#[macro_export]
macro_rules! assert_completed {
    ($outcome:expr) => {
        match $outcome {
            wardrobe_core::client::sync::SyncOutcome::Completed(report) => report,
            other => panic!("Expected a completed sync, got: {:?}", other),
        }
    };
}
