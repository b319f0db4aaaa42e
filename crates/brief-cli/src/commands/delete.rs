use brief_core::RecordId;

use crate::commands::common::{normalize_record_identifier, resolve_record};
use crate::context::AppContext;
use crate::error::CliError;

pub async fn run_delete(id: &str, context: &AppContext) -> Result<(), CliError> {
    let services = context.services()?;
    let records = services.sync.history()?;
    // Ids that are not in the local replica may still exist remotely.
    let record_id = match resolve_record(id, &records) {
        Ok(record) => record.id.clone(),
        Err(CliError::RecordNotFound(_)) => RecordId::from(normalize_record_identifier(id)?),
        Err(error) => return Err(error),
    };

    services.sync.delete(&record_id).await?;
    println!("{record_id}");
    Ok(())
}
