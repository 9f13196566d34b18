use thiserror::Error;

macro_rules! invalid_ir {
    // Single string version
    ($msg:expr) => {
        crate::Error::InvalidIr {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::InvalidIr {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The optimizer has no recoverable runtime errors of its own. Every variant signals either a
/// violated upstream invariant (malformed input IR, an identity kind that is not valid in the
/// current representation) or a failure reported by an external collaborator. Analytical
/// uncertainty, such as being unable to prove a body effect-free, is never reported through
/// this type: it simply degrades to the conservative answer.
///
/// # Error Categories
///
/// ## Contract Violations
/// - [`Error::InvalidIr`] - Structurally invalid IR (CFG, operands, targets)
/// - [`Error::UnexpectedSlot`] - A slot reference survived SSA construction
/// - [`Error::PendingNodes`] - A stage that requires compacted IR received pending insertions
/// - [`Error::EmptyBody`] - A body without statements was handed to the pipeline
///
/// ## Collaborator Failures
/// - [`Error::Transform`] - An external pass (inliner, SROA, ADCE) failed
///
/// # Examples
///
/// ```rust
/// use ssaopt::Error;
///
/// fn report(err: &Error) -> String {
///     match err {
///         Error::InvalidIr { message, file, line } => format!("{file}:{line}: {message}"),
///         other => other.to_string(),
///     }
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The IR handed to a stage violates a structural invariant.
    ///
    /// This covers malformed CFGs (ranges not partitioning the stream, asymmetric edges),
    /// branch targets outside the body, and operands referencing deleted or out of range
    /// statements. The error records the source location where the violation was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of the violated invariant
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Invalid IR - {file}:{line}: {message}")]
    InvalidIr {
        /// The message to be printed for the InvalidIr error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A slot reference was found in a representation that must be slot-free.
    ///
    /// Slots only exist before SSA construction; the associated value is the slot number.
    #[error("Slot {0} referenced after SSA construction")]
    UnexpectedSlot(usize),

    /// A stage that requires compacted IR found pending inserted nodes.
    ///
    /// The associated value is the number of pending insertions.
    #[error("IR has {0} pending inserted nodes and must be compacted first")]
    PendingNodes(usize),

    /// The body contains no statements.
    #[error("Cannot optimize an empty body")]
    EmptyBody,

    /// An external transformation reported a failure.
    #[error("Pass '{pass}' failed - {message}")]
    Transform {
        /// The name of the pass whose collaborator failed
        pass: &'static str,
        /// Description of the failure
        message: String,
    },
}

/// The result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
