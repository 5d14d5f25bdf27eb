use strata::RecordId;

#[derive(Debug)]
pub enum ExecuteResult {
    ResultSet(ResultSet),
    Insert(RecordId),
    Delete(u32),
    Ddl,
}

#[derive(Clone, Debug)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}
