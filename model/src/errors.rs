// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Errors surfaced by datastore backends.

use std::fmt::Display;
use thiserror::Error;

use crate::key::Key;
use crate::list::ListOptions;

/// What an error refers to: a single key or a list query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Identifier {
    Key(Key),
    List(ListOptions),
}

impl From<Key> for Identifier {
    fn from(key: Key) -> Self {
        Identifier::Key(key)
    }
}
impl From<ListOptions> for Identifier {
    fn from(list: ListOptions) -> Self {
        Identifier::List(list)
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Identifier::Key(key) => key.fmt(f),
            Identifier::List(list) => list.fmt(f),
        }
    }
}

/// Backend operations, as reported in errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
    Apply,
    Delete,
    Get,
    List,
    Watch,
}

impl Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Create => "Create",
            Operation::Update => "Update",
            Operation::Apply => "Apply",
            Operation::Delete => "Delete",
            Operation::Get => "Get",
            Operation::List => "List",
            Operation::Watch => "Watch",
        };
        f.write_str(name)
    }
}

type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum DatastoreError {
    #[error("operation {operation} is not supported on {identifier}")]
    OperationNotSupported {
        identifier: Identifier,
        operation: Operation,
    },
    #[error("resource already exists: {identifier}")]
    ResourceAlreadyExists { identifier: Identifier },
    #[error("resource does not exist: {identifier}")]
    ResourceDoesNotExist { identifier: Identifier },
    #[error("update conflict: {identifier}")]
    ResourceUpdateConflict { identifier: Identifier },
    #[error("connection is unauthorized: {identifier}")]
    Unauthorized { identifier: Identifier },
    #[error("invalid value for {identifier}: {reason}")]
    InvalidValue {
        identifier: Identifier,
        reason: String,
    },
    #[error("datastore client error on {identifier}: {source}")]
    Client {
        identifier: Identifier,
        #[source]
        source: BoxedError,
    },
}

impl DatastoreError {
    pub fn not_supported(identifier: impl Into<Identifier>, operation: Operation) -> Self {
        DatastoreError::OperationNotSupported {
            identifier: identifier.into(),
            operation,
        }
    }

    pub fn invalid_value(identifier: impl Into<Identifier>, reason: impl Into<String>) -> Self {
        DatastoreError::InvalidValue {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, DatastoreError::ResourceAlreadyExists { .. })
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, DatastoreError::ResourceDoesNotExist { .. })
    }

    /// The key or list query the error refers to.
    #[must_use]
    pub fn identifier(&self) -> &Identifier {
        match self {
            DatastoreError::OperationNotSupported { identifier, .. }
            | DatastoreError::ResourceAlreadyExists { identifier }
            | DatastoreError::ResourceDoesNotExist { identifier }
            | DatastoreError::ResourceUpdateConflict { identifier }
            | DatastoreError::Unauthorized { identifier }
            | DatastoreError::InvalidValue { identifier, .. }
            | DatastoreError::Client { identifier, .. } => identifier,
        }
    }
}
