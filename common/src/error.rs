// Copyright (C) 2024 Nicola Dardanis <nicdard@gmail.com>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{io, path::PathBuf};

use thiserror::Error;

use crate::crypto::{MAX_KEY_BITS, MIN_KEY_BITS};

/// Every way a run of the generator can fail.
/// None of them is recovered from: the error travels up to the binary, which reports it and exits.
#[derive(Error, Debug)]
pub enum Error {
    /// The identifier is missing or cannot name a directory.
    #[error("{0}")]
    Argument(String),
    /// Creating the output directory or one of the artifacts failed.
    #[error("filesystem error on `{}`: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("an RSA key of {0} bits is not supported, the size must be between {min} and {max} bits", min = MIN_KEY_BITS, max = MAX_KEY_BITS)]
    KeySize(usize),
    #[error("couldn't generate the RSA private key: {0}")]
    KeyGeneration(#[from] rsa::Error),
    #[error("couldn't encode the RSA private key: {0}")]
    KeyEncoding(String),
    /// The certificate signing request couldn't be built or signed.
    #[error("couldn't sign the certificate request: {0}")]
    Signing(#[from] rcgen::Error),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("invalid configuration: {0}")]
    Config(#[from] Box<figment::Error>),
}

/// Failures of the manifest template collaborator.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("couldn't read the template `{}`: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unclosed action at line {line} of the template")]
    Unclosed { line: usize },
    #[error("unsupported action `{action}` at line {line} of the template, expected `{{{{ .Name }}}}` or `{{{{ .Request }}}}`")]
    UnknownField { line: usize, action: String },
}

impl Error {
    /// Wrap an I/O error with the path it happened on.
    pub fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means the artifacts of a previous run are in the way.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::Filesystem { source, .. } if source.kind() == io::ErrorKind::AlreadyExists)
    }
}

impl From<figment::Error> for Error {
    fn from(e: figment::Error) -> Self {
        Error::Config(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
