//! Non-interactive management of subscription records.

use clap::{Args, Subcommand};
use converter::FilterCriteria;
use std::io::Write;
use subscription::record::{RecordStore, SubscriptionRecord, generate_token, hash_token, record_key};
use subscription::SubscriptionError;

#[derive(thiserror::Error, Debug)]
pub enum CommandError {
    #[error("{0}")]
    Subscription(#[from] SubscriptionError),
    #[error("could not write output: {0}")]
    Output(#[from] std::io::Error),
    #[error("could not encode record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("URL must start with http:// or https://")]
    InvalidUrl,
    #[error("invalid exclude regex: {0}")]
    InvalidRegex(#[from] regex::Error),
    #[error("no record for token")]
    NotFound,
}

#[derive(Args, Debug, Default, Clone)]
pub struct FilterArgs {
    /// Name of the filter, defaults to the subscription label
    #[arg(long)]
    pub filter_label: Option<String>,
    /// Region codes to keep, repeatable or comma-separated (e.g. hk,us)
    #[arg(long = "region", value_delimiter = ',')]
    pub regions: Vec<String>,
    #[arg(long)]
    pub max_billing_rate: Option<f64>,
    /// Proxies whose name matches are dropped
    #[arg(long)]
    pub exclude_regex: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum RecordCommand {
    /// Create a record and print its new token
    Add {
        #[arg(long)]
        label: String,
        #[arg(long)]
        url: String,
        #[command(flatten)]
        filter: FilterArgs,
    },
    Show {
        token: String,
    },
    /// List the key of every stored record
    List,
    /// Replace fields of an existing record. Given filter options replace
    /// the stored filter as a whole.
    Update {
        token: String,
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[command(flatten)]
        filter: FilterArgs,
    },
    Delete {
        token: String,
    },
}

impl FilterArgs {
    fn is_empty(&self) -> bool {
        self.filter_label.is_none()
            && self.regions.is_empty()
            && self.max_billing_rate.is_none()
            && self.exclude_regex.is_none()
    }

    fn into_criteria(self, default_label: &str) -> Result<FilterCriteria, CommandError> {
        let exclude_regex = self.exclude_regex.filter(|r| !r.is_empty());
        if let Some(pattern) = &exclude_regex {
            regex::Regex::new(pattern)?;
        }

        let regions: Vec<String> = self
            .regions
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();

        Ok(FilterCriteria {
            label: self.filter_label.unwrap_or_else(|| default_label.to_string()),
            regions: (!regions.is_empty()).then_some(regions),
            max_billing_rate: self.max_billing_rate,
            exclude_regex,
        })
    }
}

fn check_url(url: &str) -> Result<(), CommandError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(CommandError::InvalidUrl)
    }
}

pub async fn execute(
    command: RecordCommand,
    records: &RecordStore,
    out: &mut impl Write,
) -> Result<(), CommandError> {
    match command {
        RecordCommand::Add { label, url, filter } => {
            check_url(&url)?;
            let token = generate_token();
            let record = SubscriptionRecord {
                filter: filter.into_criteria(&label)?,
                token: token.clone(),
                label,
                url,
            };
            let updated_at = records.save(&record).await?;
            tracing::info!(token_hash = %hash_token(&token), updated_at, "record created");

            writeln!(out, "token: {token}")?;
            writeln!(out, "key: {}", record_key(&hash_token(&token)))?;
        }
        RecordCommand::Show { token } => {
            let record = records.load(&token).await?.ok_or(CommandError::NotFound)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&record)?)?;
        }
        RecordCommand::List => {
            for hash in records.list_hashes().await? {
                writeln!(out, "{}", record_key(&hash))?;
            }
        }
        RecordCommand::Update {
            token,
            label,
            url,
            filter,
        } => {
            let mut record = records.load(&token).await?.ok_or(CommandError::NotFound)?;
            if let Some(url) = url {
                check_url(&url)?;
                record.url = url;
            }
            if let Some(label) = label {
                record.label = label;
            }
            if !filter.is_empty() {
                record.filter = filter.into_criteria(&record.label)?;
            }

            let updated_at = records.save(&record).await?;
            tracing::info!(token_hash = %hash_token(&token), updated_at, "record updated");
            writeln!(out, "updated: {updated_at}")?;
        }
        RecordCommand::Delete { token } => {
            if !records.delete(&token).await? {
                return Err(CommandError::NotFound);
            }
            tracing::info!(token_hash = %hash_token(&token), "record deleted");
            writeln!(out, "deleted")?;
        }
    }

    Ok(())
}
