use brief_core::config::ClientConfig;
use brief_core::util::{is_http_url, normalize_text_option};

use crate::cli::ConfigCommands;
use crate::config::{
    env_lookup, load_from_path, redact_key, save_to_path, API_BASE_URL_ENV, SUPABASE_ANON_KEY_ENV,
    SUPABASE_URL_ENV,
};
use crate::context::AppContext;
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, context: &AppContext) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            api_base_url,
            supabase_url,
            supabase_anon_key,
        } => run_config_init(context, api_base_url, supabase_url, supabase_anon_key),
        ConfigCommands::Show => run_config_show(context),
    }
}

fn run_config_init(
    context: &AppContext,
    api_base_url: Option<String>,
    supabase_url: Option<String>,
    supabase_anon_key: Option<String>,
) -> Result<(), CliError> {
    // Start from the file, not the env-merged view, so env values are only
    // persisted when nothing else is known.
    let existing = load_from_path(&context.config_path)?;
    let config = merge_init_values(
        existing,
        InitValues {
            api_base_url,
            supabase_url,
            supabase_anon_key,
        },
        env_lookup,
    );
    validate_urls(&config)?;

    save_to_path(&config, &context.config_path)?;
    println!("Config written to {}", context.config_path.display());

    let missing = missing_fields(&config);
    if missing.is_empty() {
        println!("Ready. Run `brief auth login --email <email> --password <password>`.");
    } else {
        println!("Still missing: {}", missing.join(", "));
    }
    Ok(())
}

fn run_config_show(context: &AppContext) -> Result<(), CliError> {
    let mut shown = context.config.clone();
    shown.supabase_anon_key = shown.supabase_anon_key.as_deref().map(redact_key);
    println!("# {}", context.config_path.display());
    println!("{}", serde_json::to_string_pretty(&shown)?);
    println!("# history store: {}", context.db_path.display());
    Ok(())
}

pub struct InitValues {
    pub api_base_url: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
}

/// Explicit flags win, then the environment, then the existing file.
pub fn merge_init_values(
    existing: ClientConfig,
    values: InitValues,
    lookup: impl Fn(&str) -> Option<String>,
) -> ClientConfig {
    let pick = |explicit: Option<String>, env_name: &str, current: Option<String>| {
        normalize_text_option(explicit)
            .or_else(|| normalize_text_option(lookup(env_name)))
            .or(current)
    };
    ClientConfig {
        api_base_url: pick(values.api_base_url, API_BASE_URL_ENV, existing.api_base_url),
        supabase_url: pick(values.supabase_url, SUPABASE_URL_ENV, existing.supabase_url),
        supabase_anon_key: pick(
            values.supabase_anon_key,
            SUPABASE_ANON_KEY_ENV,
            existing.supabase_anon_key,
        ),
        sync: existing.sync,
    }
    .normalized()
}

pub fn validate_urls(config: &ClientConfig) -> Result<(), CliError> {
    for (name, value) in [
        ("api_base_url", config.api_base_url.as_deref()),
        ("supabase_url", config.supabase_url.as_deref()),
    ] {
        if let Some(url) = value {
            if !is_http_url(url) {
                return Err(CliError::Config(format!(
                    "{name} must include http:// or https://"
                )));
            }
        }
    }
    Ok(())
}

pub fn missing_fields(config: &ClientConfig) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if config.api_base_url.is_none() {
        missing.push("api_base_url");
    }
    if config.supabase_url.is_none() {
        missing.push("supabase_url");
    }
    if config.supabase_anon_key.is_none() {
        missing.push("supabase_anon_key");
    }
    missing
}
