// Unit tests for worker startup-argument parsing.

use crate::args::WorkerArgs;
use crate::error::WorkerError;

use bridge_core::DEFAULT_BRIDGE_PORT;

fn parse(args: &[&str]) -> Result<WorkerArgs, WorkerError> {
    WorkerArgs::parse(args.iter().map(|a| a.to_string()))
}

/// Both positional arguments supplied, as the supervisor does it.
#[test]
fn given_port_and_host_pid_when_parsed_then_both_captured() {
    let args = parse(&["45000", "4242"]).unwrap();

    assert_eq!(args.port, 45000);
    assert_eq!(args.host_pid, 4242);
}

/// **VALUE**: Verifies a bare `bridge-worker` launch still works.
///
/// **WHY THIS MATTERS**: The worker is launched by hand when debugging
/// device problems; requiring the supervisor's arguments would make that
/// impossible.
#[test]
fn given_no_arguments_when_parsed_then_defaults_apply() {
    let args = parse(&[]).unwrap();

    assert_eq!(args.port, DEFAULT_BRIDGE_PORT);
    assert_eq!(args.host_pid, 0, "Unknown host PID should parse as zero");
}

/// Port alone is enough; the host PID defaults.
#[test]
fn given_only_port_when_parsed_then_host_pid_defaults() {
    let args = parse(&["54000"]).unwrap();

    assert_eq!(args.port, 54000);
    assert_eq!(args.host_pid, 0);
}

/// A non-numeric port is a usage error, not a silent fallback.
#[test]
fn given_garbage_port_when_parsed_then_args_error() {
    let result = parse(&["not-a-port", "1"]);

    assert!(matches!(result, Err(WorkerError::Args { .. })));
}

/// A port outside u16 range is rejected the same way.
#[test]
fn given_out_of_range_port_when_parsed_then_args_error() {
    let result = parse(&["70000"]);

    assert!(matches!(result, Err(WorkerError::Args { .. })));
}

/// A non-numeric host PID is rejected too.
#[test]
fn given_garbage_host_pid_when_parsed_then_args_error() {
    let result = parse(&["54321", "host"]);

    assert!(matches!(result, Err(WorkerError::Args { .. })));
}
