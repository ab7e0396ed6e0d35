//! Error taxonomy for the HAL. Builders and `create_*` constructors return
//! `Result<T, Error>`; recording errors are detected eagerly at invocation
//! construction time, never deferred to submission.

use std::borrow::Cow;
use thiserror::Error;

/// Label of whatever resource, task, or invocation triggered an error, kept
/// around purely for diagnostics.
pub type Label = Cow<'static, str>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("[{label}] underlying gpu api call failed: {code}")]
    Gpu { label: Label, code: String },

    #[error("[{label}] no queue family on this device supports submission class {class:?}")]
    UnsupportedSubmitClass {
        label: Label,
        class: crate::context::SubmitClass,
    },

    #[error("[{label}] surface does not support any of the allowed swapchain formats")]
    NoCompatibleSurfaceFormat { label: Label },

    #[error("[{label}] buffer is too small: need {needed} bytes, have {available}")]
    BufferTooSmall {
        label: Label,
        needed: u64,
        available: u64,
    },

    #[error("[{label}] image is too small: need {needed:?}, have {available:?}")]
    ImageTooSmall {
        label: Label,
        needed: (u32, u32, u32),
        available: (u32, u32, u32),
    },

    #[error("[{label}] invalid configuration: {reason}")]
    InvalidConfig { label: Label, reason: Cow<'static, str> },

    #[error("[{label}] timestamp queries are not supported on this device")]
    TimingUnsupported { label: Label },
}

impl Error {
    pub fn gpu(label: impl Into<Label>, code: impl std::fmt::Debug) -> Self {
        Error::Gpu {
            label: label.into(),
            code: format!("{:?}", code),
        }
    }

    pub fn invalid_config(label: impl Into<Label>, reason: impl Into<Cow<'static, str>>) -> Self {
        Error::InvalidConfig {
            label: label.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
