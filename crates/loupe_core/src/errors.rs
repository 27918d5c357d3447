//! Error Types
//!
//! This module defines the error type shared by every Loupe crate.
//!
//! # Overview
//!
//! [`LoupeError`] covers the failure modes of the device context:
//! - GPU initialization and device loss
//! - Texture, view and sampler creation
//! - Shader compilation
//! - Compression of cached shader blobs
//!
//! All fallible APIs return [`Result<T>`], an alias for
//! `std::result::Result<T, LoupeError>`.

use thiserror::Error;

/// The main error type for Loupe.
#[derive(Error, Debug)]
pub enum LoupeError {
    // ========================================================================
    // Device Errors
    // ========================================================================
    /// No adapter, device or surface could be created at any acceptable
    /// feature level.
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// The GPU device was removed or reset. Every resource created from it is
    /// invalid and the context must be reinitialized.
    #[error("Device lost: {0}")]
    DeviceLost(String),

    /// An operation needed a device but the context has not been initialized.
    #[error("Device context is not initialized")]
    NotInitialized,

    /// The presentation surface failed in a way that is neither a timeout,
    /// an outdated configuration nor a device loss.
    #[error("Presentation failed: {0}")]
    Presentation(String),

    /// A frame operation was called in the wrong lifecycle state.
    #[error("Invalid frame state: {0}")]
    InvalidFrameState(String),

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// The backend rejected a texture or sampler description.
    #[error("Resource creation failed: {0}")]
    ResourceCreation(String),

    /// The backend rejected a view description, or the texture lacks the bind
    /// flag the view requires.
    #[error("View creation failed: {0}")]
    ViewCreation(String),

    /// A texture handle refers to a texture that has been destroyed.
    #[error("Stale texture handle")]
    StaleHandle,

    // ========================================================================
    // Shader Errors
    // ========================================================================
    /// Shader source failed to preprocess, parse or validate.
    #[error("Failed to compile shader '{source_name}':\n{diagnostics}")]
    ShaderCompilation {
        /// Name the source was registered under
        source_name: String,
        /// Compiler diagnostics, one message per line
        diagnostics: String,
    },

    // ========================================================================
    // Codec Errors
    // ========================================================================
    /// Compression was given an unsupported level or an oversized input.
    #[error("Compression failed: {0}")]
    Compression(String),

    /// The input is not a well-formed compressed container.
    #[error("Decompression failed: {0}")]
    Decompression(String),

    // ========================================================================
    // I/O Errors
    // ========================================================================
    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Alias for `Result<T, LoupeError>`.
pub type Result<T> = std::result::Result<T, LoupeError>;
