use crate::error::ParseError;
use crate::report::Hop;

const LATENCY_COLUMNS: [&str; 5] = ["last", "avg", "best", "worst", "stddev"];

/// Parse the text produced by `mtr --report` into hops, in path order.
///
/// Only rows that start with a hop number followed by a period (`  3.|-- ...`)
/// are considered; banners and headers are ignored. A single malformed row
/// fails the whole parse.
pub fn parse_report(text: &str) -> Result<Vec<Hop>, ParseError> {
    let mut hops = Vec::new();

    for (index, line) in text.lines().enumerate() {
        if !is_data_line(line) {
            continue;
        }
        hops.push(parse_data_line(index + 1, line)?);
    }

    Ok(hops)
}

/// `true` for lines shaped like `<whitespace><digits>.`
pub fn is_data_line(line: &str) -> bool {
    let rest = line.trim_start();
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    digits > 0 && rest.as_bytes().get(digits) == Some(&b'.')
}

fn parse_data_line(line_no: usize, line: &str) -> Result<Hop, ParseError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let token = |i: usize, column: &'static str| {
        tokens.get(i).copied().ok_or_else(|| ParseError {
            line: line_no,
            column,
            token: String::new(),
        })
    };

    let address = token(1, "address")?.to_string();

    let loss_token = token(2, "loss")?;
    let loss_percent = parse_float(line_no, "loss", loss_token.trim_end_matches('%'))?;
    if !(0.0..=100.0).contains(&loss_percent) {
        return Err(invalid(line_no, "loss", loss_token));
    }

    let sent_token = token(3, "sent")?;
    let sent = sent_token
        .parse::<u32>()
        .map_err(|_| invalid(line_no, "sent", sent_token))?;

    let mut latencies = [0.0f64; 5];
    for (slot, (offset, column)) in latencies.iter_mut().zip(LATENCY_COLUMNS.into_iter().enumerate()) {
        let raw = token(4 + offset, column)?;
        let value = parse_float(line_no, column, raw)?;
        if value < 0.0 {
            return Err(invalid(line_no, column, raw));
        }
        *slot = value;
    }
    let [last_ms, avg_ms, best_ms, worst_ms, stddev_ms] = latencies;

    Ok(Hop {
        address,
        sent,
        loss_percent,
        last_ms,
        avg_ms,
        best_ms,
        worst_ms,
        stddev_ms,
    })
}

fn parse_float(line_no: usize, column: &'static str, raw: &str) -> Result<f64, ParseError> {
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(invalid(line_no, column, raw)),
    }
}

fn invalid(line: usize, column: &'static str, token: &str) -> ParseError {
    ParseError {
        line,
        column,
        token: token.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const SAMPLE: &str = "header line 1
header line 2
  1.|-- 10.0.0.1    0.0%    5    1.2   1.5   1.0   2.0   0.3
  2.|-- 8.8.8.8      0.0%    5   10.1  11.0   9.8  12.5   1.1
";

    #[test]
    fn test_parse_sample_report() {
        let hops = parse_report(SAMPLE).unwrap();
        assert_eq!(hops.len(), 2);
        assert_eq!(
            hops[0],
            Hop {
                address: "10.0.0.1".to_string(),
                sent: 5,
                loss_percent: 0.0,
                last_ms: 1.2,
                avg_ms: 1.5,
                best_ms: 1.0,
                worst_ms: 2.0,
                stddev_ms: 0.3,
            }
        );
        assert_eq!(hops[1].address, "8.8.8.8");
        assert_eq!(hops[1].worst_ms, 12.5);
        assert_eq!(hops[1].stddev_ms, 1.1);
    }

    #[test]
    fn test_parse_real_mtr_output() {
        let text = "Start: 2024-03-01T10:00:00+0000
HOST: probe-box                   Loss%   Snt   Last   Avg  Best  Wrst StDev
  1.|-- 192.168.1.1                0.0%    10    0.4   0.5   0.3   0.9   0.2
  2.|-- ???                       100.0    10    0.0   0.0   0.0   0.0   0.0
  3.|-- 72.14.215.85              12.5%    10    8.1   9.0   7.9  14.2   1.8
 10.|-- 142.250.180.14             0.0%    10   12.0  12.3  11.8  13.1   0.4
";
        let hops = parse_report(text).unwrap();
        let addresses: Vec<_> = hops.iter().map(|h| h.address.as_str()).collect();
        assert_eq!(addresses, ["192.168.1.1", "???", "72.14.215.85", "142.250.180.14"]);
        assert_eq!(hops[1].loss_percent, 100.0);
        assert_eq!(hops[2].loss_percent, 12.5);
    }

    #[test_case("  1.|-- a 0.0% 5 1 1 1 1 1", true ; "indented hop")]
    #[test_case("12.|-- a 0.0% 5 1 1 1 1 1", true ; "no indentation")]
    #[test_case("HOST: box  Loss%  Snt", false ; "column header")]
    #[test_case("Start: 2024-03-01", false ; "start banner")]
    #[test_case("", false ; "blank")]
    #[test_case("   .|-- a", false ; "missing hop number")]
    #[test_case("  1|-- a", false ; "missing period")]
    #[test_case("  1.5 something", true ; "digits then period")]
    fn test_is_data_line(line: &str, expected: bool) {
        assert_eq!(is_data_line(line), expected);
    }

    #[test]
    fn test_non_data_lines_contribute_nothing() {
        let text = "=== banner with 1.0 numbers ===\n\nwhatever: 3. things\n";
        assert_eq!(parse_report(text).unwrap(), Vec::new());
    }

    #[test]
    fn test_loss_percent_suffix_is_stripped() {
        let hops = parse_report("  1.|-- 10.0.0.1  12.5%  8  1 1 1 1 1").unwrap();
        assert_eq!(hops[0].loss_percent, 12.5);
    }

    #[test_case("  1.|-- h 0.0% five 1 1 1 1 1", "sent" ; "sent not a number")]
    #[test_case("  1.|-- h 0.0% -3 1 1 1 1 1", "sent" ; "negative sent")]
    #[test_case("  1.|-- h 0.0% 5 x 1 1 1 1", "last" ; "last not a number")]
    #[test_case("  1.|-- h 0.0% 5 1 1 1 1 nope", "stddev" ; "stddev not a number")]
    #[test_case("  1.|-- h abc% 5 1 1 1 1 1", "loss" ; "loss not a number")]
    #[test_case("  1.|-- h 150.0% 5 1 1 1 1 1", "loss" ; "loss above hundred")]
    #[test_case("  1.|-- h 0.0% 5 1 -1 1 1 1", "avg" ; "negative latency")]
    #[test_case("  1.|-- h 0.0% 5 1 1 1", "worst" ; "truncated row")]
    fn test_malformed_row_fails(row: &str, column: &str) {
        let text = format!("  1.|-- 10.0.0.1 0.0% 5 1 1 1 1 1\n{row}\n");
        let err = parse_report(&text).unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.column, column);
    }
}
