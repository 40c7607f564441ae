/// How the store fills a column the caller left out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnDefault {
    /// No default: NULL, or a constraint error when the column is NOT NULL.
    None,
    /// Sequential integer.
    Serial,
    /// Random UUID rendered as text.
    Uuid,
    /// Insert time.
    Now,
    /// NULL at insert, set to the current time on every update.
    OnUpdate,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub nullable: bool,
    pub default: ColumnDefault,
}

impl Column {
    pub const fn required(name: &'static str) -> Self {
        Self { name, nullable: false, default: ColumnDefault::None }
    }

    pub const fn optional(name: &'static str) -> Self {
        Self { name, nullable: true, default: ColumnDefault::None }
    }

    pub const fn generated(name: &'static str, nullable: bool, default: ColumnDefault) -> Self {
        Self { name, nullable, default }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ForeignKey {
    pub name: &'static str,
    pub column: &'static str,
    pub references: &'static str,
    pub referenced_column: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct UniqueKey {
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

/// Static description of one entity table.
#[derive(Debug)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub primary_key: &'static [&'static str],
    pub unique: &'static [UniqueKey],
    pub foreign_keys: &'static [ForeignKey],
}

impl TableDef {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn touched_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns
            .iter()
            .filter(|c| c.default == ColumnDefault::OnUpdate)
    }

    pub fn pkey_name(&self) -> String {
        format!("{}_pkey", self.name)
    }
}

/// Double-quote an identifier for Postgres.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
