use std::fmt;
use std::io;

/// Errors surfaced to callers of the camera and transport layers.
///
/// The USB layer works in terms of [`io::Error`] internally; conversion into
/// this enum happens at the crate boundary via [`From`], keyed on the mapped
/// [`io::ErrorKind`].
#[derive(Debug)]
pub enum Error {
    /// No device matching the FLIR One Pro LT identifiers (09cb:1996) is
    /// attached.
    DeviceNotFound,
    /// The device is present but claimed by another process or not
    /// accessible with the current permissions.
    DeviceBusy,
    /// A USB transfer failed in a way the current session cannot recover
    /// from.
    Transport(io::Error),
    /// A frame failed validation in a context where silent resync is not an
    /// option.
    CorruptFrame(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DeviceNotFound => {
                write!(f, "FLIR One Pro LT (09cb:1996) not found; is it connected?")
            }
            Error::DeviceBusy => write!(f, "device is busy or access was denied"),
            Error::Transport(err) => write!(f, "USB transport error: {err}"),
            Error::CorruptFrame(reason) => write!(f, "corrupt frame: {reason}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Error::DeviceNotFound,
            io::ErrorKind::ResourceBusy | io::ErrorKind::PermissionDenied => Error::DeviceBusy,
            _ => Error::Transport(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_kinds_map_to_surface_variants() {
        let not_found = Error::from(io::Error::new(io::ErrorKind::NotFound, "no device"));
        assert!(matches!(not_found, Error::DeviceNotFound));

        let busy = Error::from(io::Error::new(io::ErrorKind::ResourceBusy, "claimed"));
        assert!(matches!(busy, Error::DeviceBusy));

        let denied = Error::from(io::Error::new(io::ErrorKind::PermissionDenied, "udev"));
        assert!(matches!(denied, Error::DeviceBusy));

        let other = Error::from(io::Error::new(io::ErrorKind::BrokenPipe, "stall"));
        assert!(matches!(other, Error::Transport(_)));
    }
}
