use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

pub type StdErrorBoxed = Box<dyn std::error::Error + Send + Sync + 'static>;

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    pub fn invalid_format(name: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidFormat {
                element: name.into(),
                message: Default::default(),
            }
            .into(),
        )
    }

    pub fn invalid_format_with(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidFormat {
                element: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_operation(name: impl Into<String>) -> Error {
        Error(ErrorKind::InvalidOperation { name: name.into() }.into())
    }

    /// Inputs of a combine run disagree on something that must be shared
    /// (term processor, payload schema, available features).
    pub fn incompatible(message: impl Into<String>) -> Error {
        Error(
            ErrorKind::IncompatibleInputs {
                message: message.into(),
            }
            .into(),
        )
    }

    /// The same document is defined by two inputs that are required to be disjoint.
    pub fn duplicate_document(document: u64, first_input: usize, second_input: usize) -> Error {
        Error(
            ErrorKind::DuplicateDocument {
                document,
                first_input,
                second_input,
            }
            .into(),
        )
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Error {
        Error(
            ErrorKind::Io {
                context: context.into(),
                source,
            }
            .into(),
        )
    }

    pub fn serialization<E>(context: impl Into<String>, source: E) -> Error
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error(
            ErrorKind::Serialization {
                context: context.into(),
                source: Box::new(source),
            }
            .into(),
        )
    }

    /// Returns `true` if this error reports a document defined by two inputs.
    pub fn is_duplicate_document(&self) -> bool {
        matches!(self.kind(), ErrorKind::DuplicateDocument { .. })
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid operation {name}")]
    InvalidOperation { name: String },

    #[error("invalid storage format for '{element}': {message}")]
    InvalidFormat { element: String, message: String },

    #[error("incompatible inputs: {message}")]
    IncompatibleInputs { message: String },

    #[error(
        "document {document} is present in two inputs (input {first_input} and input {second_input})"
    )]
    DuplicateDocument {
        document: u64,
        first_input: usize,
        second_input: usize,
    },

    #[error("IO error for '{context}': {source}'")]
    Io {
        context: String,
        source: std::io::Error,
    },

    #[error("serialization error: {context}")]
    Serialization {
        context: String,
        source: StdErrorBoxed,
    },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::io("", e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::serialization("json", e)
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(_: std::convert::Infallible) -> Self {
        Error::invalid_operation("conversion")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_document_display() {
        let err = Error::duplicate_document(7, 0, 2);
        assert!(err.is_duplicate_document());
        assert_eq!(
            err.to_string(),
            "document 7 is present in two inputs (input 0 and input 2)"
        );
    }

    #[test]
    fn test_io_conversion() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err.kind(), ErrorKind::Io { .. }));
        assert!(!err.is_duplicate_document());
    }

    #[test]
    fn test_into_kind() {
        let kind = Error::incompatible("term processors differ").into_kind();
        match kind {
            ErrorKind::IncompatibleInputs { message } => {
                assert_eq!(message, "term processors differ")
            }
            other => panic!("unexpected error kind: {other:?}"),
        }
    }
}
