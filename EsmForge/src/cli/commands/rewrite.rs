//! CLI command for rewriting a file through the reader and writer

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use crate::formats::common::TextEncoding;
use crate::formats::esm::{EsmReader, EsmWriter};
use crate::formats::records::RawSubrecord;

/// Copy every record of `source` to `destination` subrecord by subrecord.
///
/// Returns the number of records written.
pub fn rewrite_file(source: &Path, destination: &Path, encoding: TextEncoding) -> crate::Result<usize> {
    let mut reader = EsmReader::new().with_encoding(encoding);
    reader.open_path(source)?;

    let file = BufWriter::new(File::create(destination)?);
    let mut writer = EsmWriter::new(file)?.with_encoding(encoding);
    writer.set_header(reader.header().clone());
    writer.save()?;

    let mut records = 0usize;
    while reader.has_more_recs() {
        let name = reader.get_rec_name()?;
        let flags = reader.get_rec_header()?;
        writer.start_record(name, flags)?;
        while reader.has_more_subs() {
            reader.get_sub_name()?;
            RawSubrecord::read(&mut reader)?.write(&mut writer)?;
        }
        writer.end_record(name)?;
        records += 1;
    }

    writer.close()?;
    Ok(records)
}

pub fn execute(source: &Path, destination: &Path, encoding: TextEncoding) -> anyhow::Result<()> {
    let records = rewrite_file(source, destination, encoding)?;
    println!("Wrote {records} records to {}", destination.display());

    if fs::read(source)? == fs::read(destination)? {
        println!("Output is byte-identical to the source");
    } else {
        println!("Output differs from the source");
    }

    Ok(())
}
