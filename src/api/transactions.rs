use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::AppState;
use crate::error::{AppError, AppResult};
use crate::models::TransactionStatus;

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionStatusResponse {
    pub id: String,
    pub status: TransactionStatus,
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<TransactionStatusResponse>> {
    debug!("Transaction status requested: {}", id);

    let tx = state
        .transactions
        .find_by_id(&id)
        .await?
        .ok_or_else(|| AppError::not_found("Transaction", id.clone()))?;

    Ok(Json(TransactionStatusResponse {
        id: tx.id,
        status: tx.status,
    }))
}
