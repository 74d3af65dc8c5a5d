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
use std::{
    fmt,
    path::{Path, PathBuf},
};

use config::Settings;
use crypto::{
    encode64, encode_private_key_to_pem, generate_private_key, mk_certificate_request, Subject,
};
use error::{Error, Result};
use pki::{create_output_dir, write_file};

pub mod config;
pub mod crypto;
pub mod error;
pub mod manifest;
pub mod pki;

/// The message reported when no identifier is given on the command line.
pub const MISSING_NAME_MESSAGE: &str = "Name was not supplied. Please supply name as first argument";
/// The name of the file holding the base64 encoded certificate signing request.
pub const ENCODED_REQUEST_FILE_NAME: &str = "encoded-key.txt";

/// The name the credentials are generated for.
/// It is used as the common name of the request and names the output directory and files,
/// so it must be a single, non-empty path component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::Argument(MISSING_NAME_MESSAGE.to_string()));
        }
        if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
            return Err(Error::Argument(format!(
                "The name `{}` cannot be used as a directory name",
                name
            )));
        }
        Ok(Identifier(name))
    }

    /// Take the identifier from the first command line argument, the program name excluded.
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = args
            .into_iter()
            .next()
            .ok_or_else(|| Error::Argument(MISSING_NAME_MESSAGE.to_string()))?;
        Identifier::new(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The artifacts produced by a successful run, all inside `dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputBundle {
    pub dir: PathBuf,
    /// `<name>.key`, the PEM encoded PKCS#1 private key.
    pub key_path: PathBuf,
    /// `<name>.csr`, the PEM encoded certificate signing request.
    pub request_path: PathBuf,
    /// `encoded-key.txt`, the base64 encoding of the PEM request.
    pub encoded_request_path: PathBuf,
    /// `<name>-csr-definition.yaml`, the rendered manifest.
    pub manifest_path: PathBuf,
}

impl OutputBundle {
    /// The layout of the bundle for `name` under `output_root`.
    pub fn layout(output_root: &Path, name: &Identifier) -> Self {
        let dir = output_root.join(name.as_str());
        OutputBundle {
            key_path: dir.join(format!("{}.key", name)),
            request_path: dir.join(format!("{}.csr", name)),
            encoded_request_path: dir.join(ENCODED_REQUEST_FILE_NAME),
            manifest_path: dir.join(format!("{}-csr-definition.yaml", name)),
            dir,
        }
    }

    /// Every file of the bundle, in the order they are written.
    pub fn files(&self) -> [&Path; 4] {
        [
            &self.key_path,
            &self.request_path,
            &self.encoded_request_path,
            &self.manifest_path,
        ]
    }
}

/// Generate a private key and a certificate signing request for `name` and write them,
/// together with the rendered manifest, in a new directory under the output root.
///
/// The steps run in a fixed order and the first failure aborts the run. Files written before the
/// failure are left in place: a missing template still leaves the key and the request on disk.
/// The settings are validated before anything is written. The output directory is created next
/// and must not exist, so a repeated run never touches the artifacts of a previous one.
pub fn generate_bundle(name: &Identifier, settings: &Settings) -> Result<OutputBundle> {
    settings.validate()?;
    let bundle = OutputBundle::layout(&settings.output_root, name);
    create_output_dir(&bundle.dir)?;

    let private_key = generate_private_key(settings.key_bits)?;
    let encoded_private_key = encode_private_key_to_pem(&private_key)?;
    write_file(&bundle.key_path, &encoded_private_key)?;
    log::info!("Key saved to: {}", bundle.key_path.display());

    let subject = Subject::from_settings(name.as_str(), &settings.subject);
    let request = mk_certificate_request(&subject, &private_key)?;
    write_file(&bundle.request_path, &request)?;
    log::info!("Certificate signing request saved to: {}", bundle.request_path.display());

    let encoded_request = encode64(&request);
    write_file(&bundle.encoded_request_path, encoded_request.as_bytes())?;

    let manifest = manifest::render_manifest(&settings.template, name.as_str(), &encoded_request)?;
    write_file(&bundle.manifest_path, manifest.as_bytes())?;
    log::info!("Manifest saved to: {}", bundle.manifest_path.display());

    Ok(bundle)
}
