use core::any::Any;

use anyhow::Error;
use logging::error_with_status;

pub fn log(payload: Box<dyn Any + Send + 'static>) {
    let thread = std::thread::current();
    // Use the same default as the standard library and various third-party crates.
    let name = thread.name().unwrap_or("<unnamed>");
    let error = payload_into_error(payload);
    error_with_status!("thread {name} panicked: {error}");
}

#[must_use]
pub fn payload_into_error(payload: Box<dyn Any + Send + 'static>) -> Error {
    let payload = match payload.downcast::<String>() {
        Ok(string) => return Error::msg(*string),
        Err(other) => other,
    };

    if let Ok(string) = payload.downcast::<&str>() {
        return Error::msg(*string);
    }

    Error::msg("panic with payload of unknown type")
}

#[cfg(test)]
mod tests {
    use core::panic::AssertUnwindSafe;

    use test_case::test_case;

    use super::*;

    #[test_case(Box::new("static message"), "static message")]
    #[test_case(Box::new("owned message".to_owned()), "owned message")]
    #[test_case(Box::new(7_u8), "panic with payload of unknown type")]
    fn payload_into_error_extracts_message(payload: Box<dyn Any + Send>, expected: &str) {
        assert_eq!(payload_into_error(payload).to_string(), expected);
    }

    #[test]
    fn payload_of_caught_panic_is_converted() {
        let error = std::panic::catch_unwind(AssertUnwindSafe(|| panic!("dispatch loop failed")))
            .map_err(payload_into_error)
            .expect_err("closure panics");

        assert_eq!(error.to_string(), "dispatch loop failed");
    }
}
