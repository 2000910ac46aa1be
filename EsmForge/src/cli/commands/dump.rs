//! CLI command for listing records

use std::path::Path;

use indexmap::IndexMap;

use crate::formats::common::{RecName, RecordFlags, TextEncoding};
use crate::formats::esm::EsmReader;

fn flag_names(flags: RecordFlags) -> String {
    let names: Vec<&str> = flags.iter_names().map(|(name, _)| name).collect();
    if names.is_empty() {
        String::new()
    } else {
        format!(" [{}]", names.join(", ").to_lowercase())
    }
}

pub fn execute(
    path: &Path,
    encoding: TextEncoding,
    record: Option<&str>,
    limit: Option<usize>,
    count: bool,
) -> anyhow::Result<()> {
    let filter: Option<RecName> = record.map(str::parse::<RecName>).transpose()?;

    let mut reader = EsmReader::new().with_encoding(encoding);
    reader.open_path(path)?;

    let mut counts: IndexMap<RecName, usize> = IndexMap::new();
    let mut shown = 0usize;

    while reader.has_more_recs() {
        if limit.is_some_and(|limit| shown >= limit) {
            break;
        }

        let name = reader.get_rec_name()?;
        let flags = reader.get_rec_header()?;
        let size = reader.left_rec();

        if filter.is_some_and(|f| f != name) {
            reader.skip_record()?;
            continue;
        }
        *counts.entry(name).or_insert(0) += 1;
        shown += 1;

        if count {
            reader.skip_record()?;
            continue;
        }

        println!("{name} ({size} bytes){}", flag_names(flags));
        while reader.has_more_subs() {
            let sub = reader.get_sub_name()?;
            let sub_size = reader.get_sub_header()?;
            println!("  {sub} ({sub_size} bytes)");
            reader.skip(sub_size)?;
        }
    }

    if count {
        for (name, n) in &counts {
            println!("{name}: {n}");
        }
    } else {
        println!();
        println!("{shown} records");
    }

    Ok(())
}
