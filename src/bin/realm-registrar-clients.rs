//! Realm registrar client management CLI.
//!
//! Drives dynamic client registration (RFC 7591 / RFC 7592) against an identity
//! provider realm. Initial access tokens for `register` are issued through the
//! administrative API, and an expired registration access token is rotated
//! once and the call retried when `get`, `update` or `delete` is rejected with
//! HTTP 401.
//!
//! ## Usage Examples
//!
//! ```bash
//! realm-registrar-clients --idp-base-url https://idp.example.com --realm org-2 register \
//!   --name "Billing" \
//!   --redirect-uri "https://billing.example.com/callback" \
//!   --grant-type authorization_code \
//!   --grant-type refresh_token
//!
//! realm-registrar-clients get \
//!   --client-id billing \
//!   --registration-uri "https://idp.example.com/realms/org-2/clients-registrations/openid-connect/billing" \
//!   --registration-token "$REGISTRATION_ACCESS_TOKEN"
//! ```
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error (configuration, network, parsing, etc.)
//! - 2: The identity provider rejected the call
//! - 3: Authentication error (HTTP 401)

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use realm_registrar::{
    admin::{AdminClient, AdminCredentials},
    credentials::TokenRefresher,
    errors::{is_http_error, is_unauthorized},
    registration::{ClientAuthMethod, ClientInformation, ClientMetadata, GrantType, RegistrationClient, ResponseType},
    transport::{AuthRetryTransport, ReqwestTransport, RequestContext, Transport},
};
use serde_json::Value;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::prelude::*;
use url::Url;

/// Main CLI application structure
#[derive(Parser)]
#[command(
    name = "realm-registrar-clients",
    about = "Realm registrar client management CLI",
    long_about = "Registers, reads, updates and deletes OAuth clients in an identity provider realm \
                  through RFC 7591/7592 dynamic client registration.",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// Base URL of the identity provider
    #[arg(long, env = "IDP_BASE_URL")]
    idp_base_url: String,

    /// Realm in which clients are registered
    #[arg(long, env = "IDP_REALM", default_value = "master")]
    realm: String,

    /// Realm holding the administrative client
    #[arg(long, env = "IDP_ADMIN_REALM", default_value = "master")]
    admin_realm: String,

    /// Administrative client id; required for register and for token refresh
    #[arg(long, env = "IDP_ADMIN_CLIENT_ID")]
    admin_client_id: Option<String>,

    /// Administrative client secret
    #[arg(long, env = "IDP_ADMIN_CLIENT_SECRET", hide_env_values = true)]
    admin_client_secret: Option<String>,

    /// Lifetime requested for initial access tokens
    #[arg(long, env = "INITIAL_ACCESS_TOKEN_EXPIRATION", default_value = "5m", value_parser = parse_duration)]
    initial_access_expiration: Duration,

    /// Outbound request timeout
    #[arg(long, env = "HTTP_CLIENT_TIMEOUT", default_value = "10s", value_parser = parse_duration)]
    timeout: Duration,

    /// Enable verbose output
    #[arg(short, long, help = "Enable debug logging on stderr")]
    verbose: bool,

    /// Output format
    #[arg(
        long,
        value_enum,
        default_value = "json",
        help = "Output format for responses"
    )]
    format: OutputFormat,

    /// Print secrets and registration access tokens in table output
    #[arg(long)]
    show_secrets: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format options
#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    /// JSON formatted output
    Json,
    /// Pretty-printed JSON output
    JsonPretty,
    /// Human-readable table format
    Table,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Register a new OAuth client
    Register(RegisterArgs),
    /// Get information about an existing client
    Get(ClientArgs),
    /// Replace the metadata of an existing client
    Update(UpdateArgs),
    /// Delete an existing client
    Delete(DeleteArgs),
}

/// Identity of a registered client
#[derive(Args)]
struct ClientArgs {
    /// Client ID
    #[arg(long, env = "REGISTRAR_CLIENT_ID")]
    client_id: String,

    /// Registration client URI returned at registration
    #[arg(long, env = "REGISTRAR_REGISTRATION_URI")]
    registration_uri: String,

    /// Registration access token
    #[arg(long, env = "REGISTRAR_REGISTRATION_TOKEN", hide_env_values = true)]
    registration_token: String,
}

/// Client metadata accepted by register and update
#[derive(Args)]
struct MetadataArgs {
    /// Human-readable name for the client
    #[arg(long)]
    name: Option<String>,

    /// OAuth redirect URIs (can be specified multiple times)
    #[arg(long = "redirect-uri")]
    redirect_uris: Vec<String>,

    /// OAuth grant types (can be specified multiple times)
    #[arg(long = "grant-type")]
    grant_types: Vec<GrantType>,

    /// OAuth response types (can be specified multiple times)
    #[arg(long = "response-type")]
    response_types: Vec<ResponseType>,

    /// OAuth scopes (space-separated)
    #[arg(long)]
    scope: Option<String>,

    /// Token endpoint authentication method
    #[arg(long = "auth-method")]
    auth_method: Option<ClientAuthMethod>,

    /// Contact addresses (can be specified multiple times)
    #[arg(long = "contact")]
    contacts: Vec<String>,

    /// Additional metadata as a JSON object
    #[arg(
        long,
        help = "Additional client metadata as JSON object (e.g., '{\"custom_field\": \"value\"}')"
    )]
    metadata: Option<String>,
}

#[derive(Args)]
struct RegisterArgs {
    /// Registration endpoint; defaults to the realm's openid-connect registration endpoint
    #[arg(long)]
    endpoint: Option<String>,

    #[command(flatten)]
    metadata: MetadataArgs,
}

#[derive(Args)]
struct UpdateArgs {
    #[command(flatten)]
    client: ClientArgs,

    #[command(flatten)]
    metadata: MetadataArgs,
}

#[derive(Args)]
struct DeleteArgs {
    #[command(flatten)]
    client: ClientArgs,

    /// Skip confirmation prompt
    #[arg(long, help = "Skip the confirmation prompt")]
    yes: bool,
}

/// Main application entry point
#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "realm_registrar=debug,info"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(err) = run(&cli).await {
        eprintln!("Error: {err:#}");
        process::exit(exit_code(&err));
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    if is_unauthorized(err.as_ref()) {
        3
    } else if is_http_error(err.as_ref()) {
        2
    } else {
        1
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let cancellation = CancellationToken::new();
    {
        let cancellation = cancellation.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancellation.cancel();
            }
        });
    }
    let ctx = RequestContext::with_cancellation(cancellation);

    let http_client = reqwest::Client::builder()
        .user_agent(format!("realm-registrar/{}", env!("CARGO_PKG_VERSION")))
        .timeout(cli.timeout)
        .build()?;
    let admin = admin_client(cli, &http_client)?;

    let transport: Arc<dyn Transport> = Arc::new(AuthRetryTransport::new(
        Arc::new(ReqwestTransport::new(http_client)),
        admin.clone().map(|admin| admin as Arc<dyn TokenRefresher>),
    ));
    let mut registration = RegistrationClient::new(transport);
    if let Some(admin) = &admin {
        registration = registration.with_token_source(admin.clone());
    }

    match &cli.command {
        Commands::Register(args) => {
            let endpoint = match (&args.endpoint, &admin) {
                (Some(endpoint), _) => endpoint.clone(),
                (None, Some(admin)) => admin.registration_endpoint()?.to_string(),
                (None, None) => bail!("register requires --admin-client-id and --admin-client-secret"),
            };
            let metadata = client_metadata(&args.metadata)?;
            tracing::debug!(%endpoint, "registering client");

            let information = registration
                .register(&ctx, &endpoint, &metadata)
                .await
                .context("registering client")?;
            output_client(&cli.format, &information, cli.show_secrets)
        }
        Commands::Get(args) => {
            let information = registration
                .read(&ctx, &args.client_id, &args.registration_uri, &args.registration_token)
                .await
                .with_context(|| format!("reading client '{}'", args.client_id))?;
            output_client(&cli.format, &information, cli.show_secrets)
        }
        Commands::Update(args) => {
            let metadata = client_metadata(&args.metadata)?;
            let information = registration
                .update(
                    &ctx,
                    &args.client.client_id,
                    &args.client.registration_uri,
                    &args.client.registration_token,
                    &metadata,
                )
                .await
                .with_context(|| format!("updating client '{}'", args.client.client_id))?;
            output_client(&cli.format, &information, cli.show_secrets)
        }
        Commands::Delete(args) => {
            if !args.yes && !confirm_deletion(&args.client.client_id)? {
                println!("Deletion cancelled.");
                return Ok(());
            }

            registration
                .delete(
                    &ctx,
                    &args.client.client_id,
                    &args.client.registration_uri,
                    &args.client.registration_token,
                )
                .await
                .with_context(|| format!("deleting client '{}'", args.client.client_id))?;
            println!("Client '{}' deleted successfully.", args.client.client_id);
            Ok(())
        }
    }
}

fn admin_client(cli: &Cli, http_client: &reqwest::Client) -> Result<Option<Arc<AdminClient>>> {
    let (Some(client_id), Some(client_secret)) = (&cli.admin_client_id, &cli.admin_client_secret)
    else {
        return Ok(None);
    };

    let base_url = Url::parse(&cli.idp_base_url)
        .with_context(|| format!("parsing identity provider URL '{}'", cli.idp_base_url))?;
    let credentials = AdminCredentials {
        realm: cli.admin_realm.clone(),
        client_id: client_id.clone(),
        client_secret: client_secret.clone(),
    };
    let admin = AdminClient::new(http_client.clone(), base_url, cli.realm.clone(), credentials)?
        .with_initial_access_expiration(cli.initial_access_expiration);
    Ok(Some(Arc::new(admin)))
}

fn client_metadata(args: &MetadataArgs) -> Result<ClientMetadata> {
    let extra = match &args.metadata {
        Some(raw) => match serde_json::from_str::<Value>(raw).context("parsing --metadata")? {
            Value::Object(members) => members,
            _ => bail!("--metadata must be a JSON object"),
        },
        None => serde_json::Map::new(),
    };

    Ok(ClientMetadata {
        client_name: args.name.clone(),
        redirect_uris: args.redirect_uris.clone(),
        grant_types: args.grant_types.clone(),
        response_types: args.response_types.clone(),
        token_endpoint_auth_method: args.auth_method.clone(),
        scope: args.scope.clone(),
        contacts: args.contacts.clone(),
        extra,
        ..Default::default()
    })
}

fn confirm_deletion(client_id: &str) -> Result<bool> {
    println!("Are you sure you want to delete client '{client_id}'? (y/N)");
    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .context("reading confirmation")?;

    let input = input.trim().to_lowercase();
    Ok(input == "y" || input == "yes")
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    duration_str::parse(value).map_err(|err| err.to_string())
}

/// Print a client document; JSON formats carry every member unmasked.
fn output_client(format: &OutputFormat, information: &ClientInformation, show_secrets: bool) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(information)?),
        OutputFormat::JsonPretty => println!("{}", serde_json::to_string_pretty(information)?),
        OutputFormat::Table => {
            let rows = client_rows(information, show_secrets)?;
            let width = rows.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
            for (key, value) in rows {
                println!("{key:<width$}  {value}");
            }
        }
    }
    Ok(())
}

/// Registration fields first, then the registered metadata by member name.
fn client_rows(information: &ClientInformation, show_secrets: bool) -> Result<Vec<(String, String)>> {
    let mut rows = vec![("client_id".to_string(), information.client_id.clone())];
    if let Some(secret) = &information.client_secret {
        rows.push(("client_secret".to_string(), reveal(secret, show_secrets)));
    }
    if information.client_id_issued_at != 0 {
        rows.push(("issued_at".to_string(), timestamp(information.client_id_issued_at)));
    }
    if information.client_secret.is_some() {
        let expires = match information.client_secret_expires_at {
            0 => "never".to_string(),
            at => timestamp(at),
        };
        rows.push(("secret_expires_at".to_string(), expires));
    }
    if !information.registration_client_uri.is_empty() {
        rows.push((
            "registration_client_uri".to_string(),
            information.registration_client_uri.clone(),
        ));
    }
    if !information.registration_access_token.is_empty() {
        rows.push((
            "registration_access_token".to_string(),
            reveal(&information.registration_access_token, show_secrets),
        ));
    }

    if let Value::Object(metadata) = serde_json::to_value(&information.metadata)? {
        for (key, value) in metadata {
            let value = match value {
                Value::String(text) => text,
                Value::Array(items) => items
                    .iter()
                    .map(|item| item.as_str().map_or_else(|| item.to_string(), str::to_string))
                    .collect::<Vec<_>>()
                    .join(", "),
                other => other.to_string(),
            };
            rows.push((key, value));
        }
    }
    Ok(rows)
}

fn reveal(secret: &str, show_secrets: bool) -> String {
    if show_secrets {
        secret.to_string()
    } else {
        "********".to_string()
    }
}

fn timestamp(seconds: i64) -> String {
    DateTime::<Utc>::from_timestamp(seconds, 0)
        .map_or_else(|| seconds.to_string(), |at| at.to_rfc3339())
}
