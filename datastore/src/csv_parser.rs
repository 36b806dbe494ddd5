//! Parses one report file into an ordered list of typed records (spec §4.1).

use district_report_types::CsvRecord;
use district_report_types::report::CsvValue;

/// Parses `content` into records, one per data line.
///
/// Lines that are empty after trim are dropped, as are any line containing
/// the literal "Month of" (a footer line some report exports carry). The
/// first remaining line is the header row; every later line is a data row
/// keyed by those headers.
pub fn parse_report(content: &str) -> Vec<CsvRecord> {
    let mut lines = content
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty())
        .filter(|l| !l.contains("Month of"));

    let header_line = match lines.next() {
        Some(line) => line,
        None => return Vec::new(),
    };
    let headers = split_csv_line(header_line);

    lines
        .map(|line| {
            let fields = split_csv_line(line);
            let mut record = CsvRecord::new();
            for (i, header) in headers.iter().enumerate() {
                let raw = fields.get(i).map(String::as_str).unwrap_or("");
                record.insert(header.clone(), type_field(header, raw));
            }
            record
        })
        .collect()
}

/// Typed field coercion: `REGION` always stays text (leading zeros matter);
/// the empty string becomes null; anything that parses as a finite base-10
/// number (optional decimal point) becomes a number; everything else stays
/// text.
fn type_field(header: &str, raw: &str) -> CsvValue {
    let trimmed = raw.trim();
    if header == "REGION" {
        return CsvValue::Text(trimmed.to_string());
    }
    if trimmed.is_empty() {
        return CsvValue::Null;
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => CsvValue::Number(n),
        _ => CsvValue::Text(trimmed.to_string()),
    }
}

/// Splits one CSV line on commas, honoring `"`-quoted fields (a doubled `""`
/// inside a quoted field yields a single `"`; commas inside quotes are
/// literal). Fields are trimmed after splitting.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current).trim().to_string());
            }
            c => current.push(c),
        }
    }
    fields.push(current.trim().to_string());

    fields
}

/// Serializes records back into CSV text for the Backfill Controller, which
/// receives records from the Fetch Source but must persist raw bytes into
/// the Raw CSV Cache (spec §3 `CachedReport.content`). The header row is
/// the union of every record's keys, in their natural (sorted) order since
/// [`CsvRecord`] is a `BTreeMap`.
pub fn write_report(records: &[CsvRecord]) -> Vec<u8> {
    let mut headers: Vec<&str> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !headers.contains(&key.as_str()) {
                headers.push(key.as_str());
            }
        }
    }

    let mut out = String::new();
    out.push_str(&headers.join(","));
    out.push('\n');
    for record in records {
        let fields: Vec<String> = headers
            .iter()
            .map(|h| match record.get(*h) {
                Some(CsvValue::Number(n)) => n.to_string(),
                Some(CsvValue::Text(s)) => escape_csv_field(s),
                Some(CsvValue::Null) | None => String::new(),
            })
            .collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out.into_bytes()
}

fn escape_csv_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_blank_lines_and_month_of_footer() {
        let content = "DISTRICT,REGION,Active Members\n\n42,07,120\nMonth of January report\n";
        let records = parse_report(content);
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].get("Active Members").unwrap(),
            &CsvValue::Number(120.0)
        );
    }

    #[test]
    fn region_stays_text_preserving_leading_zero() {
        let content = "DISTRICT,REGION\n42,07\n";
        let records = parse_report(content);
        assert_eq!(records[0].get("REGION").unwrap(), &CsvValue::Text("07".into()));
    }

    #[test]
    fn handles_quoted_fields_with_commas_and_escaped_quotes() {
        let content = "DISTRICT,Club Name\n42,\"Rotary, Downtown \"\"Club\"\"\"\n";
        let records = parse_report(content);
        assert_eq!(
            records[0].get("Club Name").unwrap(),
            &CsvValue::Text("Rotary, Downtown \"Club\"".into())
        );
    }

    #[test]
    fn empty_string_becomes_null() {
        let content = "DISTRICT,Notes\n42,\n";
        let records = parse_report(content);
        assert_eq!(records[0].get("Notes").unwrap(), &CsvValue::Null);
    }

    #[test]
    fn write_report_round_trips_through_parse_report() {
        let content = "Active Members,DISTRICT\n120,42\n";
        let records = parse_report(content);
        let written = write_report(&records);
        let reparsed = parse_report(&String::from_utf8(written).unwrap());
        assert_eq!(reparsed, records);
    }
}
