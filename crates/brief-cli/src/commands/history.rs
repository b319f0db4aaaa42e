use brief_core::models::SummaryLength;
use brief_core::Record;

use crate::cli::HistoryCommands;
use crate::commands::common::{
    format_history_lines, format_record_details, record_to_list_item, resolve_record,
    HistoryListItem,
};
use crate::context::AppContext;
use crate::error::CliError;

pub fn run_history(command: HistoryCommands, context: &AppContext) -> Result<(), CliError> {
    match command {
        HistoryCommands::Add {
            url,
            summary,
            title,
            length,
            tags,
        } => run_history_add(context, build_record(&url, title, &summary, length.into(), tags)),
        HistoryCommands::List { limit, json } => run_history_list(context, limit, json),
        HistoryCommands::Show { id, json } => run_history_show(context, &id, json),
    }
}

pub fn build_record(
    url: &str,
    title: Option<String>,
    summary: &str,
    length: SummaryLength,
    tags: Vec<String>,
) -> Record {
    let mut record = Record::new(
        url.trim(),
        title.unwrap_or_default().trim(),
        summary.trim(),
        length,
    );
    record.metadata.word_count = u64::try_from(summary.split_whitespace().count()).ok();
    record.metadata.tags = tags
        .into_iter()
        .map(|tag| tag.trim().trim_start_matches('#').to_string())
        .filter(|tag| !tag.is_empty())
        .collect();
    record
}

fn run_history_add(context: &AppContext, record: Record) -> Result<(), CliError> {
    let entry = context.local_history()?.save(record)?;
    println!("{}", entry.record.id);
    Ok(())
}

fn run_history_list(context: &AppContext, limit: usize, as_json: bool) -> Result<(), CliError> {
    let records: Vec<Record> = context
        .local_history()?
        .replica()
        .load()?
        .into_iter()
        .take(limit)
        .collect();

    if as_json {
        let items = records
            .iter()
            .map(record_to_list_item)
            .collect::<Vec<HistoryListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if records.is_empty() {
        println!("No history yet.");
    } else {
        for line in format_history_lines(&records) {
            println!("{line}");
        }
    }
    Ok(())
}

fn run_history_show(context: &AppContext, id: &str, as_json: bool) -> Result<(), CliError> {
    let records = context.local_history()?.replica().load()?;
    let record = resolve_record(id, &records)?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(record)?);
    } else {
        println!("{}", format_record_details(record));
    }
    Ok(())
}
