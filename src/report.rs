use contender_core::alloy::primitives::{B256, TxHash};
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path};

/// A transfer correlated with the CCIP message it produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub destination: String,
    pub iterations: u64,
    pub gas_limit: u64,
    pub message_id: B256,
    pub tx_hash: TxHash,
}

/// Records in emission order. Nothing is deduplicated or filtered.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageReport {
    records: Vec<MessageRecord>,
}

impl MessageReport {
    pub fn push(&mut self, record: MessageRecord) {
        self.records.push(record);
    }

    #[cfg(test)]
    pub fn records(&self) -> &[MessageRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }
}

impl fmt::Display for MessageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] Number of iterations {} - Gas limit: {} - Message Id: {}",
            self.destination, self.iterations, self.gas_limit, self.message_id
        )
    }
}

impl fmt::Display for MessageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.records.is_empty() {
            return writeln!(f, "No messages were sent.");
        }
        for record in &self.records {
            writeln!(f, "{record}")?;
        }
        Ok(())
    }
}
