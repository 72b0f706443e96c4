use clap::{Args, Parser, Subcommand};
use fhir::{FhirResourceType, FhirResourceTypeMapper, RawFhirFormatter};
use hc_core::{
    config, CallerIdentity, CoreConfig, CreateMedicalDataSourceRequest, MedicalDataService,
    MedicalResource, MedicalResourceId, MedicalResourceType, MedicalResourceValidator,
    PackageName, PageTokenWrapper, ReadMedicalResourcesRequest, UpsertMedicalResourceRequest,
    UuidService,
};
use std::collections::BTreeSet;
use std::error::Error;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

type CliResult<T> = Result<T, Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "hc")]
#[command(about = "Health Connect medical data CLI")]
struct Cli {
    /// Storage root (falls back to `health_data`)
    #[arg(long, global = true, env = "HC_DATA_DIR")]
    data_dir: Option<String>,
    /// Per-package data source limit
    #[arg(long, global = true, env = "HC_MAX_DATA_SOURCES")]
    max_data_sources: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Identifies the app a store-backed command acts for. It is granted every medical permission.
#[derive(Args)]
struct PackageArg {
    #[arg(long)]
    package: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a FHIR resource file as an upsert would
    Validate {
        /// Path to the JSON file, or `-` for stdin
        file: String,
        #[arg(long, default_value = "4.0.1")]
        fhir_version: String,
        /// Data source the resource would be written to
        #[arg(long, default_value = "")]
        data_source_id: String,
    },
    /// Pretty-print raw FHIR JSON
    Format {
        /// Path to the JSON file, or `-` for stdin
        file: String,
    },
    /// Print the storage id of a resource
    DeriveId {
        data_source_id: String,
        /// FHIR resource type, e.g. Immunization
        fhir_resource_type: String,
        fhir_resource_id: String,
    },
    /// Encode or decode page tokens
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
    /// Manage medical data sources
    DataSource {
        #[command(subcommand)]
        command: DataSourceCommands,
    },
    /// Insert or overwrite FHIR resources from files
    Upsert {
        #[command(flatten)]
        package: PackageArg,
        #[arg(long)]
        data_source_id: String,
        #[arg(long, default_value = "4.0.1")]
        fhir_version: String,
        /// Paths to JSON files, one resource each
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Read one page of resources
    Read {
        #[command(flatten)]
        package: PackageArg,
        /// Medical resource type, e.g. IMMUNIZATION
        #[arg(long = "type")]
        medical_resource_type: String,
        /// Data source ids (comma-separated)
        #[arg(long, value_delimiter = ',')]
        data_source_ids: Vec<String>,
        #[arg(long)]
        page_size: Option<u32>,
        #[arg(long, allow_hyphen_values = true)]
        page_token: Option<i64>,
        /// Newest first
        #[arg(long, conflicts_with = "page_token")]
        descending: bool,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Build a token from its parts
    Encode {
        #[arg(long)]
        descending: bool,
        #[arg(long, allow_hyphen_values = true)]
        time: i64,
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        offset: i64,
    },
    /// Show the parts of a token
    Decode {
        #[arg(allow_hyphen_values = true)]
        token: i64,
    },
}

#[derive(Subcommand)]
enum DataSourceCommands {
    /// Create a data source
    Create {
        #[command(flatten)]
        package: PackageArg,
        #[arg(long)]
        display_name: String,
        #[arg(long)]
        fhir_base_uri: String,
    },
    /// List the package's data sources
    List {
        #[command(flatten)]
        package: PackageArg,
    },
    /// Delete a data source and all of its resources
    Delete {
        #[command(flatten)]
        package: PackageArg,
        id: String,
    },
}

fn read_input(file: &str) -> CliResult<String> {
    if file == "-" {
        Ok(io::read_to_string(io::stdin().lock())?)
    } else {
        let mut data = String::new();
        std::fs::File::open(file)?.read_to_string(&mut data)?;
        Ok(data)
    }
}

fn open_service(cli: &Cli) -> CliResult<MedicalDataService> {
    let data_dir: PathBuf = config::data_dir_from_env_value(cli.data_dir.clone());
    let max_sources = config::max_data_sources_from_env_value(cli.max_data_sources.clone())?;
    let cfg = CoreConfig::new(data_dir, max_sources)?;
    Ok(MedicalDataService::open(Arc::new(cfg))?)
}

fn caller(package: &PackageArg) -> CliResult<CallerIdentity> {
    Ok(CallerIdentity::with_all_medical_permissions(
        PackageName::parse(&package.package)?,
    ))
}

fn print_resource(out: &mut impl Write, resource: &MedicalResource) -> io::Result<()> {
    let modified = chrono::DateTime::from_timestamp_millis(resource.last_modified_time_millis)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default();
    writeln!(
        out,
        "{}  {}/{}  {}  {}",
        resource.id,
        resource.fhir_resource.resource_type(),
        resource.fhir_resource.id(),
        resource.display_name(),
        modified
    )
}

fn run(cli: Cli, out: &mut impl Write) -> CliResult<()> {
    let Some(command) = &cli.command else {
        writeln!(out, "Use 'hc --help' for commands")?;
        return Ok(());
    };

    match command {
        Commands::Validate {
            file,
            fhir_version,
            data_source_id,
        } => {
            let request = UpsertMedicalResourceRequest::new(
                data_source_id.as_str(),
                fhir_version.as_str(),
                read_input(file)?,
            );
            let validated = MedicalResourceValidator::new().validate(&request)?;
            writeln!(
                out,
                "OK: {} {}/{} (FHIR {}), id {}",
                validated.medical_resource_type,
                validated.fhir_resource_type,
                validated.fhir_resource_id,
                validated.fhir_version,
                validated.uuid()
            )?;
        }
        Commands::Format { file } => {
            writeln!(out, "{}", RawFhirFormatter::format_str(&read_input(file)?))?;
        }
        Commands::DeriveId {
            data_source_id,
            fhir_resource_type,
            fhir_resource_id,
        } => {
            let resource_type = FhirResourceTypeMapper::to_type(fhir_resource_type);
            if resource_type == FhirResourceType::Unknown {
                return Err(format!("unknown FHIR resource type: {}", fhir_resource_type).into());
            }
            let id = MedicalResourceId::new(
                data_source_id.as_str(),
                resource_type,
                fhir_resource_id.as_str(),
            );
            writeln!(out, "{}", id.uuid())?;
        }
        Commands::Token { command } => match command {
            TokenCommands::Encode {
                descending,
                time,
                offset,
            } => {
                let token = PageTokenWrapper::of(!descending, *time, *offset)?;
                writeln!(out, "{}", token.encode())?;
            }
            TokenCommands::Decode { token } => {
                let token = PageTokenWrapper::decode(*token, true)?;
                if !token.is_timestamp_set() {
                    writeln!(out, "no timestamp (first page)")?;
                } else {
                    writeln!(
                        out,
                        "ascending: {}, time: {}, offset: {}",
                        token.is_ascending(),
                        token.time_millis(),
                        token.offset()
                    )?;
                }
            }
        },
        Commands::DataSource { command } => {
            let service = open_service(&cli)?;
            match command {
                DataSourceCommands::Create {
                    package,
                    display_name,
                    fhir_base_uri,
                } => {
                    let request = CreateMedicalDataSourceRequest::new(
                        fhir_base_uri.as_str(),
                        display_name.as_str(),
                    );
                    let source =
                        service.create_medical_data_source(&caller(package)?, &request)?;
                    writeln!(out, "Created data source with UUID: {}", source.id)?;
                }
                DataSourceCommands::List { package } => {
                    let caller = caller(package)?;
                    let packages = BTreeSet::from([caller.package_name().clone()]);
                    let sources =
                        service.get_medical_data_sources_by_packages(&caller, &packages)?;
                    if sources.is_empty() {
                        writeln!(out, "No data sources found.")?;
                    }
                    for source in sources {
                        writeln!(
                            out,
                            "{}  {}  {}",
                            source.id, source.display_name, source.fhir_base_uri
                        )?;
                    }
                }
                DataSourceCommands::Delete { package, id } => {
                    let id = UuidService::parse(id)?;
                    service.delete_medical_data_source_with_data(&caller(package)?, &id)?;
                    writeln!(out, "Deleted data source {}", id)?;
                }
            }
        }
        Commands::Upsert {
            package,
            data_source_id,
            fhir_version,
            files,
        } => {
            let requests = files
                .iter()
                .map(|file| {
                    read_input(file).map(|data| {
                        UpsertMedicalResourceRequest::new(
                            data_source_id.as_str(),
                            fhir_version.as_str(),
                            data,
                        )
                    })
                })
                .collect::<CliResult<Vec<_>>>()?;
            let service = open_service(&cli)?;
            let written = service.upsert_medical_resources(&caller(package)?, &requests)?;
            writeln!(out, "Upserted {} resource(s)", written.len())?;
            for resource in &written {
                print_resource(out, resource)?;
            }
        }
        Commands::Read {
            package,
            medical_resource_type,
            data_source_ids,
            page_size,
            page_token,
            descending,
        } => {
            let resource_type =
                MedicalResourceType::from_name(medical_resource_type).ok_or_else(|| {
                    format!("unsupported medical resource type: {}", medical_resource_type)
                })?;
            let ids = data_source_ids
                .iter()
                .map(|id| UuidService::parse(id.trim()))
                .collect::<Result<Vec<_>, _>>()?;

            let mut builder =
                ReadMedicalResourcesRequest::builder(resource_type).data_source_ids(ids);
            if let Some(page_size) = page_size {
                builder = builder.page_size(*page_size);
            }
            if let Some(page_token) = page_token {
                builder = builder.page_token(*page_token);
            }
            if *descending {
                builder = builder.ascending(false);
            }
            let request = builder.build()?;

            let service = open_service(&cli)?;
            let page = service.read_medical_resources(&caller(package)?, &request)?;
            for resource in &page.medical_resources {
                print_resource(out, resource)?;
            }
            writeln!(
                out,
                "next page token: {}, remaining: {}",
                page.next_page_token, page.remaining_count
            )?;
        }
    }

    Ok(())
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    run(cli, &mut io::stdout().lock())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    const IMMUNIZATION: &str =
        r#"{"resourceType":"Immunization","id":"imm-1","vaccineCode":{"text":"MMR"}}"#;

    fn run_args(args: &[&str]) -> CliResult<String> {
        let cli = Cli::try_parse_from(std::iter::once("hc").chain(args.iter().copied()))?;
        let mut out = Vec::new();
        run(cli, &mut out)?;
        Ok(String::from_utf8(out)?)
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_token_encode_and_decode() {
        let encoded = run_args(&["token", "encode", "--time", "1", "--offset", "2"]).unwrap();
        assert_eq!(encoded.trim(), ((1i64 << 62) | (1 << 18) | 2).to_string());

        let decoded = run_args(&["token", "decode", encoded.trim()]).unwrap();
        assert_eq!(decoded.trim(), "ascending: true, time: 1, offset: 2");

        let first = run_args(&["token", "decode", "-1"]).unwrap();
        assert!(first.contains("first page"));

        assert!(run_args(&["token", "encode", "--time", "-5"]).is_err());
    }

    #[test]
    fn test_derive_id_matches_core() {
        let out = run_args(&["derive-id", "ds-1", "Immunization", "imm-1"]).unwrap();
        let expected =
            MedicalResourceId::new("ds-1", FhirResourceType::Immunization, "imm-1").uuid();
        assert_eq!(out.trim(), expected.to_string());

        assert!(run_args(&["derive-id", "ds-1", "Spaceship", "x"]).is_err());
    }

    #[test]
    fn test_validate_and_format_files() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("imm.json");
        std::fs::write(&path, IMMUNIZATION).unwrap();
        let path = path.to_str().unwrap();

        let out = run_args(&["validate", path]).unwrap();
        assert!(out.starts_with("OK: IMMUNIZATION IMMUNIZATION/imm-1"));

        assert!(run_args(&["validate", path, "--fhir-version", "5.0.0"]).is_err());

        let out = run_args(&["format", path]).unwrap();
        assert!(out.starts_with("{\n    \"resourceType\": \"Immunization\","));
    }

    #[test]
    fn test_store_commands_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().to_str().unwrap();
        let resource_path = temp_dir.path().join("imm.json");
        std::fs::write(&resource_path, IMMUNIZATION).unwrap();

        let out = run_args(&[
            "--data-dir",
            data_dir,
            "data-source",
            "create",
            "--package",
            "com.example.app",
            "--display-name",
            "Clinic",
            "--fhir-base-uri",
            "https://fhir.example.com",
        ])
        .unwrap();
        let source_id = out.trim().rsplit(' ').next().unwrap().to_string();

        let out = run_args(&[
            "--data-dir",
            data_dir,
            "data-source",
            "list",
            "--package",
            "com.example.app",
        ])
        .unwrap();
        assert!(out.contains("Clinic"));

        let out = run_args(&[
            "--data-dir",
            data_dir,
            "upsert",
            "--package",
            "com.example.app",
            "--data-source-id",
            &source_id,
            resource_path.to_str().unwrap(),
        ])
        .unwrap();
        assert!(out.starts_with("Upserted 1 resource(s)"));
        assert!(out.contains("MMR"));

        let out = run_args(&[
            "--data-dir",
            data_dir,
            "read",
            "--package",
            "com.example.app",
            "--type",
            "immunization",
        ])
        .unwrap();
        assert!(out.contains("IMMUNIZATION/imm-1"));
        assert!(out.contains("next page token: -1, remaining: 0"));

        let out = run_args(&[
            "--data-dir",
            data_dir,
            "data-source",
            "delete",
            "--package",
            "com.example.app",
            &source_id,
        ])
        .unwrap();
        assert!(out.starts_with("Deleted data source"));
    }

    #[test]
    fn test_descending_conflicts_with_page_token() {
        assert!(Cli::try_parse_from([
            "hc",
            "read",
            "--package",
            "com.example.app",
            "--type",
            "IMMUNIZATION",
            "--page-token",
            "5",
            "--descending",
        ])
        .is_err());
    }
}
