use crate::record::MedicalRecord;

/// FIFO pool of records that have been submitted but not yet mined.
#[derive(Debug, Clone, Default)]
pub struct Mempool {
    records: Vec<MedicalRecord>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_record(&mut self, record: MedicalRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[MedicalRecord] {
        &self.records
    }

    /// Empties the pool, handing back its contents in submission order.
    pub fn drain(&mut self) -> Vec<MedicalRecord> {
        std::mem::take(&mut self.records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
