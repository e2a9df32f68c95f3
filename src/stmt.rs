/// Handle to a server-side prepared statement.
///
/// Holds the server-assigned id and the parameter/column counts from the
/// prepare response; the definition metadata itself is discarded after the
/// prepare read. Valid only on the connection that prepared it; deallocate
/// with [`Conn::close_statement`](crate::Conn::close_statement).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statement {
    pub(crate) id: u32,
    pub(crate) num_params: u16,
    pub(crate) num_columns: u16,
}

impl Statement {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn param_count(&self) -> usize {
        self.num_params as usize
    }

    pub fn column_count(&self) -> usize {
        self.num_columns as usize
    }
}

/// Outcome of a row-less command: the last result set's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecInfo {
    pub affected_rows: u64,
    pub last_insert_id: u64,
}
