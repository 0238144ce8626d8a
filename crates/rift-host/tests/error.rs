//! Tests for error handling

use std::io;

use rift_host::error::{HostError, HostResult};

#[test]
fn test_invalid_handle_display()
{
    let error = HostError::InvalidHandle;
    let message = format!("{}", error);
    assert!(message.contains("invalid file handle"));
}

#[test]
fn test_io_error_display()
{
    let error = HostError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"));
    let message = format!("{}", error);
    assert!(message.contains("I/O error"));
    assert!(message.contains("permission denied"));
}

#[test]
fn test_io_error_from_conversion()
{
    let io_error = io::Error::new(io::ErrorKind::NotFound, "no such file");
    let error: HostError = io_error.into();
    match error {
        HostError::Io(inner) => assert_eq!(inner.kind(), io::ErrorKind::NotFound),
        other => panic!("expected Io variant, got {other:?}"),
    }
}

#[test]
fn test_unsupported_display()
{
    let error = HostError::Unsupported("seek of an override-backed resource");
    let message = format!("{}", error);
    assert!(message.contains("not supported"));
    assert!(message.contains("seek"));
}

#[test]
fn test_invalid_mode_display()
{
    let error = HostError::InvalidMode("q+".to_string());
    let message = format!("{}", error);
    assert!(message.contains("invalid open mode"));
    assert!(message.contains("q+"));
}

#[test]
fn test_result_type()
{
    // Test that Result type is properly aliased
    let _result: HostResult<()> = Ok(());
    let _error_result: HostResult<()> = Err(HostError::InvalidHandle);
}
