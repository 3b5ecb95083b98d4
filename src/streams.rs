/// One-identifier-per-line input and output streams, optionally gzipped
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Read the distinct identifiers of a file
///
/// Line terminators are stripped and blank lines skipped; nothing else
/// is trimmed.
pub fn read_identifiers(path: &Path, gzipped: bool) -> io::Result<BTreeSet<String>> {
    let file = File::open(path)?;
    let reader: Box<dyn Read> = if gzipped {
        Box::new(MultiGzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(file)
    };

    parse_identifiers(BufReader::new(reader))
}

fn parse_identifiers<R: BufRead>(reader: R) -> io::Result<BTreeSet<String>> {
    let mut identifiers = BTreeSet::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.strip_suffix('\r').unwrap_or(&line);
        if !line.is_empty() {
            identifiers.insert(line.to_string());
        }
    }
    Ok(identifiers)
}

/// Write one line per item to `path`, or stdout when `None`
pub fn write_lines<I, S>(path: Option<&Path>, gzipped: bool, lines: I) -> io::Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let sink: Box<dyn Write> = match path {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout().lock()),
    };

    if gzipped {
        let mut encoder = GzEncoder::new(sink, Compression::default());
        emit(&mut encoder, lines)?;
        encoder.finish()?.flush()
    } else {
        let mut sink = sink;
        emit(&mut sink, lines)?;
        sink.flush()
    }
}

fn emit<W: Write, I, S>(out: &mut W, lines: I) -> io::Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for line in lines {
        out.write_all(line.as_ref().as_bytes())?;
        out.write_all(b"\n")?;
    }
    Ok(())
}
