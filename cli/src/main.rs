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
use std::path::PathBuf;

use clap::Parser;
use common::{
    config::{Settings, DEFAULT_CONFIG_FILE_PATH},
    crypto::{MAX_KEY_BITS, MIN_KEY_BITS},
    error::Result,
    generate_bundle, Identifier,
};

/// Generate an RSA private key, a certificate signing request for it and a YAML manifest
/// embedding the request.
///
/// The files are written in a new `<NAME>/` directory, which must not exist yet.
#[derive(Parser, Debug)]
#[command(name = "csrgen", version)]
struct Cli {
    /// The name to generate the credentials for, used as the common name of the request.
    name: Option<String>,

    /// Size in bits of the RSA key.
    #[arg(
        short,
        long,
        value_parser = clap::value_parser!(u16).range((MIN_KEY_BITS as i64)..=(MAX_KEY_BITS as i64))
    )]
    bits: Option<u16>,

    /// The manifest template, with `{{ .Name }}` and `{{ .Request }}` placeholders.
    #[arg(short, long)]
    template: Option<PathBuf>,

    /// The directory in which the `<NAME>/` directory is created.
    #[arg(short, long)]
    output_root: Option<PathBuf>,

    /// The settings file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE_PATH)]
    config: PathBuf,

    /// Country (C) of the subject.
    #[arg(long)]
    country: Option<String>,

    /// State or province (ST) of the subject.
    #[arg(long)]
    state: Option<String>,

    /// Locality (L) of the subject.
    #[arg(long)]
    locality: Option<String>,

    /// Organization (O) of the subject.
    #[arg(long)]
    organization: Option<String>,

    /// Organizational unit (OU) of the subject.
    #[arg(long)]
    organizational_unit: Option<String>,
}

impl Cli {
    /// Load the settings and apply the command line overrides on top.
    fn settings(&self) -> Result<Settings> {
        let mut settings = Settings::load(&self.config)?;
        if let Some(bits) = self.bits {
            settings.key_bits = bits.into();
        }
        if let Some(template) = &self.template {
            settings.template = template.clone();
        }
        if let Some(output_root) = &self.output_root {
            settings.output_root = output_root.clone();
        }
        let subject = &mut settings.subject;
        for (value, setting) in [
            (&self.country, &mut subject.country),
            (&self.state, &mut subject.state),
            (&self.locality, &mut subject.locality),
            (&self.organization, &mut subject.organization),
            (&self.organizational_unit, &mut subject.organizational_unit),
        ] {
            if value.is_some() {
                *setting = value.clone();
            }
        }
        settings.validate()?;
        Ok(settings)
    }
}

fn run(cli: Cli) -> Result<()> {
    let name = Identifier::from_args(cli.name.clone())?;
    let settings = cli.settings()?;
    let bundle = generate_bundle(&name, &settings)?;
    log::info!(
        "Credentials for `{}` generated in `{}`.",
        name,
        bundle.dir.display()
    );
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run(Cli::parse()) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {

    use clap::CommandFactory;
    use common::error::Error;

    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn name_is_the_only_positional() {
        let cli = Cli::try_parse_from(["csrgen", "acme", "--bits", "4096"]).unwrap();
        assert_eq!(cli.name.as_deref(), Some("acme"));
        assert_eq!(cli.bits, Some(4096));
        assert_eq!(cli.config, PathBuf::from("csrgen.toml"));
    }

    #[test]
    fn bits_follow_the_key_generator_range() {
        for bits in ["512", "1024", "4608", "8192"] {
            let cli = Cli::try_parse_from(["csrgen", "acme", "--bits", bits]).unwrap();
            assert_eq!(cli.bits.map(|b| b.to_string()).as_deref(), Some(bits));
        }
        assert!(Cli::try_parse_from(["csrgen", "acme", "--bits", "511"]).is_err());
        assert!(Cli::try_parse_from(["csrgen", "acme", "--bits", "8193"]).is_err());
    }

    #[test]
    fn missing_name_is_reported() {
        let cli = Cli::try_parse_from(["csrgen"]).unwrap();
        let err = run(cli).unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
        assert_eq!(err.to_string(), common::MISSING_NAME_MESSAGE);
    }

    #[test]
    fn flags_override_settings() {
        let cli = Cli::try_parse_from([
            "csrgen",
            "acme",
            "--config",
            "does-not-exist.toml",
            "--bits",
            "3072",
            "--template",
            "csr.yaml",
            "--output-root",
            "out",
            "--organization",
            "Company Ltd",
        ])
        .unwrap();
        let settings = cli.settings().unwrap();
        assert_eq!(settings.key_bits, 3072);
        assert_eq!(settings.template, PathBuf::from("csr.yaml"));
        assert_eq!(settings.output_root, PathBuf::from("out"));
        assert_eq!(settings.subject.organization.as_deref(), Some("Company Ltd"));
        assert_eq!(settings.subject.country, None);
    }
}
