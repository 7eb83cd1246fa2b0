use heapscan::MemoryError;

/// A host service reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostError {
    pub operation: &'static str,
    /// HRESULT-style status code as returned by the host.
    pub status: i32,
}

impl HostError {
    pub const FAIL: i32 = 0x8000_4005_u32 as i32;
    pub const INVALID_ARG: i32 = 0x8007_0057_u32 as i32;

    pub fn new(operation: &'static str, status: i32) -> Self {
        Self { operation, status }
    }

    pub fn fail(operation: &'static str) -> Self {
        Self::new(operation, Self::FAIL)
    }
}

impl std::fmt::Display for HostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "host call {} failed with status {:#010x}",
            self.operation, self.status as u32
        )
    }
}

impl std::error::Error for HostError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Host(HostError),
    Memory(MemoryError),
    /// The host reported a size that cannot be an object; the cursor
    /// cannot advance past it.
    InvalidObjectSize { address: usize, size: usize },
    Config(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host(err) => write!(f, "{err}"),
            Self::Memory(err) => write!(f, "heap access failed: {err}"),
            Self::InvalidObjectSize { address, size } => {
                write!(f, "object at {address:#x} reports size {size}")
            }
            Self::Config(message) => write!(f, "invalid settings: {message}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Host(err) => Some(err),
            Self::Memory(err) => Some(err),
            _ => None,
        }
    }
}

impl From<HostError> for Error {
    fn from(err: HostError) -> Self {
        Self::Host(err)
    }
}

impl From<MemoryError> for Error {
    fn from(err: MemoryError) -> Self {
        Self::Memory(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_error_shows_operation_and_status() {
        let err = Error::from(HostError::fail("GetObjectSize"));
        assert_eq!(
            err.to_string(),
            "host call GetObjectSize failed with status 0x80004005"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
