//! Status command for showing what the local store holds.

use std::io::Write;
use std::path::Path;

use anyhow::Result;

use sp_db::Database;

pub fn run<W: Write>(writer: &mut W, db: &Database, database_path: &Path) -> Result<()> {
    let counts = db.table_counts()?;

    writeln!(writer, "Staffing planner status")?;
    writeln!(writer, "Database: {}", database_path.display())?;

    if counts.iter().all(|count| count.rows == 0) {
        writeln!(writer, "No records stored. Run `sp import` first.")?;
        return Ok(());
    }

    writeln!(writer, "Tables:")?;
    for count in counts {
        writeln!(writer, "- {}: {}", count.table, count.rows)?;
    }

    Ok(())
}
