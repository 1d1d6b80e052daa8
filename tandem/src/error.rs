use std::io;
use std::os::fd::RawFd;

use tandem_api::errors::EngineError;
use thiserror::Error;

/// Errors from writing a [`crate::active_object::Promise`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FutureError {
    #[error("Future already completed")]
    AlreadyCompleted,
}

/// Error half of every future result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Method request failed: {0}")]
    Execution(String),
    #[error("Method request was discarded before completing")]
    Abandoned,
}

/// Failure raised while a method request executes against its servant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("Method request panicked: {0}")]
    Panicked(String),
}

impl From<ExecutionError> for TaskError {
    fn from(err: ExecutionError) -> Self {
        TaskError::Execution(err.to_string())
    }
}

/// Errors related to reactor registration and polling.
#[derive(Error, Debug)]
pub enum ReactorError {
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(RawFd),
    #[error("Reactor is stopped")]
    Stopped,
    #[error("Readiness wait failed: {0}")]
    Wait(#[source] io::Error),
    #[error("Failed to create reactor waker: {0}")]
    Setup(#[source] io::Error),
}

/// Leadership protocol violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LeaderError {
    #[error("Calling thread is not the leader")]
    NotLeader,
}

/// Errors related to starting and stopping the dispatch machinery.
#[derive(Error, Debug)]
pub enum SystemError {
    #[error("Already running")]
    AlreadyRunning,
    #[error("Not running")]
    NotRunning,
    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Reactor(#[from] ReactorError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Internal system error: {0}")]
    Other(#[from] anyhow::Error),
}
