use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::trace;

use super::{Commit, Granularity, LoadTrigger, Receipt, wrong_commit};
use crate::common::{PurchaseTime, TICKET_COLUMNS, TicketRecord};
use crate::warehouse::{BindValue, WarehouseClient};

/// ✍️ One ticket, one `INSERT`. No stage, no Parquet, no batching, no hurry.
///
/// The nested objects go over as JSON text and come back out of `PARSE_JSON`.
/// A missing object is sent as the text `null`, which `PARSE_JSON` turns into
/// a JSON null. Same as the script this replaced.
#[derive(Debug)]
pub struct DirectInsertTrigger {
    client: WarehouseClient,
    table: String,
}

impl DirectInsertTrigger {
    pub fn new(client: WarehouseClient, table: String) -> Self {
        Self { client, table }
    }

    pub fn statement(&self) -> String {
        format!(
            "INSERT INTO {} ({}) SELECT ?,?,?,?,?,?,?,PARSE_JSON(?),?,?,PARSE_JSON(?)",
            self.table,
            TICKET_COLUMNS.join(", ")
        )
    }
}

/// 📎 The eleven positional bindings, in column order.
pub(crate) fn row_bindings(record: &TicketRecord) -> Result<Vec<BindValue>> {
    let purchase_time = match &record.purchase_time {
        PurchaseTime::Iso(text) => BindValue::Text(Some(text.clone())),
        PurchaseTime::Epoch(seconds) => BindValue::Real(*seconds),
    };
    let address = serde_json::to_string(&record.address)
        .context("💀 The address refused to become JSON text")?;
    let emergency_contact = serde_json::to_string(&record.emergency_contact)
        .context("💀 The emergency contact refused to become JSON text")?;

    Ok(vec![
        BindValue::Text(Some(record.txid.clone())),
        BindValue::Text(Some(record.rfid.clone())),
        BindValue::Text(Some(record.resort.clone())),
        purchase_time,
        BindValue::Text(Some(record.expiration_time.clone())),
        BindValue::Fixed(i64::from(record.days)),
        BindValue::Text(Some(record.name.clone())),
        BindValue::Text(Some(address)),
        BindValue::Text(record.phone.clone()),
        BindValue::Text(record.email.clone()),
        BindValue::Text(Some(emergency_contact)),
    ])
}

#[async_trait]
impl LoadTrigger for DirectInsertTrigger {
    fn name(&self) -> &'static str {
        "direct insert"
    }

    fn granularity(&self) -> Granularity {
        Granularity::RowByRow
    }

    async fn commit(&mut self, commit: Commit<'_>) -> Result<Receipt> {
        let Commit::Row(record) = commit else {
            return Err(wrong_commit(self.name(), &commit));
        };
        let bindings = row_bindings(record)?;
        self.client
            .execute(&self.statement(), Some(&bindings))
            .await
            .with_context(|| format!("💀 INSERT of ticket '{}' into {} failed", record.txid, self.table))?;
        trace!("✍️ inserted ticket {}", record.txid);
        Ok(Receipt::Inserted)
    }

    async fn close(&mut self) -> Result<()> {
        self.client.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::fixtures::{full_ticket, sparse_ticket};
    use crate::warehouse::test_support::config_for;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn the_one_where_absent_objects_bind_as_the_text_null() {
        let bindings = row_bindings(&sparse_ticket(1)).unwrap();
        assert_eq!(bindings.len(), 11);
        assert_eq!(bindings[7], BindValue::Text(Some("null".into())));
        assert_eq!(bindings[8], BindValue::Text(None));
        assert_eq!(bindings[9], BindValue::Text(None));
        assert_eq!(bindings[10], BindValue::Text(Some("null".into())));
    }

    #[test]
    fn the_one_where_present_objects_bind_as_json_text() {
        let bindings = row_bindings(&full_ticket(2)).unwrap();
        let BindValue::Text(Some(address)) = &bindings[7] else {
            panic!("💀 address should bind as text");
        };
        let parsed: serde_json::Value = serde_json::from_str(address).unwrap();
        assert_eq!(parsed["postalcode"], "81657");
        assert_eq!(bindings[5], BindValue::Fixed(3));
    }

    #[tokio::test]
    async fn the_one_where_one_ticket_is_one_insert() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/statements"))
            .and(body_partial_json(json!({
                "statement": "INSERT INTO lift_tickets (txid, rfid, resort, purchase_time, expiration_time, days, name, address, phone, email, emergency_contact) SELECT ?,?,?,?,?,?,?,PARSE_JSON(?),?,?,PARSE_JSON(?)",
                "bindings": { "1": { "type": "TEXT", "value": "tx-0007" } },
                "parameters": { "query_tag": "liftx-insert" },
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "statementHandle": "ins-1",
                "resultSetMetaData": { "rowType": [{ "name": "number of rows inserted" }] },
                "data": [["1"]],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = WarehouseClient::connect(&config_for(&server), "liftx-insert").unwrap();
        let mut trigger = DirectInsertTrigger::new(client, "lift_tickets".into());
        let ticket = full_ticket(7);
        assert_eq!(trigger.commit(Commit::Row(&ticket)).await.unwrap(), Receipt::Inserted);
    }
}
