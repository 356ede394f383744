//! Parse the Prometheus text exposition format into metric families.
//!
//! Each non-blank line is one of `# HELP`, `# TYPE`, another comment, or a sample
//! `name{label="value",...} value [timestamp]`. Lines are grouped into families in order of
//! first appearance; `_bucket`, `_sum` and `_count` samples join their histogram or summary
//! family when that family was declared with `# TYPE`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag},
    character::complete::{alpha1, alphanumeric1, char, space0, space1},
    combinator::{all_consuming, cut, map, map_res, opt, recognize, rest, value},
    multi::{many0, separated_list0},
    sequence::{pair, preceded, separated_pair, terminated, tuple},
    IResult,
};

type LineResult<'a, O> = IResult<&'a str, O>;

/// The `# TYPE` of a metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Summary,
    #[default]
    Untyped,
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "counter" => Ok(Self::Counter),
            "gauge" => Ok(Self::Gauge),
            "histogram" => Ok(Self::Histogram),
            "summary" => Ok(Self::Summary),
            "untyped" => Ok(Self::Untyped),
            other => Err(format!("unknown metric type {:?}", other)),
        }
    }
}

impl MetricKind {
    /// The label holding the bucket bound or quantile of a histogram or summary sample.
    pub fn bound_label(self) -> Option<&'static str> {
        match self {
            Self::Histogram => Some("le"),
            Self::Summary => Some("quantile"),
            _ => None,
        }
    }
}

/// One sample line, as written in the exposition.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub name: String,
    pub labels: Vec<(String, String)>,
    pub value: f64,
    /// milliseconds since the epoch, when the exporter supplied one
    pub timestamp_ms: Option<i64>,
}

impl RawSample {
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub help: Option<String>,
    kind: Option<MetricKind>,
    pub samples: Vec<RawSample>,
}

impl MetricFamily {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            help: None,
            kind: None,
            samples: Vec::new(),
        }
    }

    /// Families without a `# TYPE` line are untyped.
    pub fn kind(&self) -> MetricKind {
        self.kind.unwrap_or_default()
    }
}

/// A syntax error in the exposition body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpositionError {
    line: usize,
    message: String,
}

impl ExpositionError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }

    /// 1-based line number of the offending line.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ExpositionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ExpositionError {}

/// Parse a complete exposition body.
pub fn parse(body: &str) -> Result<Vec<MetricFamily>, ExpositionError> {
    let mut parser = Parser::default();
    for (idx, line) in body.lines().enumerate() {
        parser.line(idx + 1, line)?;
    }
    Ok(parser.families)
}

#[derive(Default)]
struct Parser {
    families: Vec<MetricFamily>,
    index: HashMap<String, usize>,
}

impl Parser {
    fn line(&mut self, lineno: usize, raw: &str) -> Result<(), ExpositionError> {
        let line = raw.trim();
        if line.is_empty() {
            return Ok(());
        }

        let (_, parsed) =
            parse_line(line).map_err(|e| ExpositionError::new(lineno, describe(line, e)))?;
        match parsed {
            Line::Comment => {}
            Line::Help { name, doc } => {
                let family = self.family(name);
                if family.help.is_some() {
                    return Err(ExpositionError::new(
                        lineno,
                        format!("second HELP line for metric name {:?}", name),
                    ));
                }
                family.help = Some(unescape_help(doc));
            }
            Line::Type { name, kind } => {
                let family = self.family(name);
                if family.kind.is_some() {
                    return Err(ExpositionError::new(
                        lineno,
                        format!("second TYPE line for metric name {:?}", name),
                    ));
                }
                if !family.samples.is_empty() {
                    return Err(ExpositionError::new(
                        lineno,
                        format!("TYPE line for metric name {:?} after its samples", name),
                    ));
                }
                family.kind = Some(kind);
            }
            Line::Sample(sample) => {
                check_labels(&sample).map_err(|m| ExpositionError::new(lineno, m))?;
                let family_name = self.family_name_for(&sample.name);
                let family = self.family(&family_name);
                check_bound(family.kind(), &sample).map_err(|m| ExpositionError::new(lineno, m))?;
                family.samples.push(sample);
            }
        }
        Ok(())
    }

    fn family(&mut self, name: &str) -> &mut MetricFamily {
        let idx = match self.index.get(name) {
            Some(idx) => *idx,
            None => {
                self.families.push(MetricFamily::new(name));
                let idx = self.families.len() - 1;
                self.index.insert(name.to_owned(), idx);
                idx
            }
        };
        &mut self.families[idx]
    }

    fn family_name_for(&self, sample_name: &str) -> String {
        use MetricKind::*;
        if self.index.contains_key(sample_name) {
            return sample_name.to_owned();
        }
        const GROUPED: [(&str, &[MetricKind]); 3] = [
            ("_bucket", &[Histogram]),
            ("_sum", &[Histogram, Summary]),
            ("_count", &[Histogram, Summary]),
        ];

        for (suffix, kinds) in GROUPED {
            let Some(base) = sample_name.strip_suffix(suffix) else {
                continue;
            };
            if let Some(family) = self.index.get(base).map(|&idx| &self.families[idx]) {
                if kinds.contains(&family.kind()) {
                    return base.to_owned();
                }
            }
        }
        sample_name.to_owned()
    }
}

fn check_labels(sample: &RawSample) -> Result<(), String> {
    for (i, (name, _)) in sample.labels.iter().enumerate() {
        if name == crate::sample::METRIC_NAME_LABEL {
            return Err(format!("label name {:?} is reserved", name));
        }
        if sample.labels[..i].iter().any(|(seen, _)| seen == name) {
            return Err(format!(
                "duplicate label name {:?} for metric {:?}",
                name, sample.name
            ));
        }
    }
    Ok(())
}

fn check_bound(kind: MetricKind, sample: &RawSample) -> Result<(), String> {
    let Some(label) = kind.bound_label() else {
        return Ok(());
    };
    match sample.label(label) {
        Some(value) if value.parse::<f64>().is_err() => Err(format!(
            "expected float as value for '{}' label, got {:?}",
            label, value
        )),
        _ => Ok(()),
    }
}

fn describe(line: &str, err: nom::Err<nom::error::Error<&str>>) -> String {
    let what = if line.starts_with('#') {
        "comment"
    } else {
        "sample"
    };
    match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let column = line.len() - e.input.len() + 1;
            if e.input.is_empty() {
                format!("malformed {} line: unexpected end of line", what)
            } else {
                format!("malformed {} line near column {}", what, column)
            }
        }
        nom::Err::Incomplete(_) => format!("malformed {} line: incomplete input", what),
    }
}

fn unescape_help(doc: &str) -> String {
    let mut out = String::with_capacity(doc.len());
    let mut chars = doc.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
enum Line<'a> {
    Help { name: &'a str, doc: &'a str },
    Type { name: &'a str, kind: MetricKind },
    Comment,
    Sample(RawSample),
}

fn parse_line(line: &str) -> LineResult<'_, Line<'_>> {
    all_consuming(alt((comment_line, map(sample_line, Line::Sample))))(line)
}

fn comment_line(input: &str) -> LineResult<'_, Line<'_>> {
    preceded(
        pair(char('#'), space0),
        alt((
            preceded(
                pair(tag("HELP"), space1),
                cut(map(
                    pair(metric_name, opt(preceded(space1, rest))),
                    |(name, doc)| Line::Help {
                        name,
                        doc: doc.unwrap_or(""),
                    },
                )),
            ),
            preceded(
                pair(tag("TYPE"), space1),
                cut(map(
                    separated_pair(
                        metric_name,
                        space1,
                        map_res(terminated(is_not(" \t"), space0), MetricKind::from_str),
                    ),
                    |(name, kind)| Line::Type { name, kind },
                )),
            ),
            value(Line::Comment, rest),
        )),
    )(input)
}

fn sample_line(input: &str) -> LineResult<'_, RawSample> {
    let (rest, name) = metric_name(input)?;
    let (rest, labels) = opt(preceded(space0, label_set))(rest)?;
    // a closing brace already separates the value from the name
    let (rest, _) = if labels.is_some() {
        space0(rest)?
    } else {
        space1(rest)?
    };
    let (rest, value) = map_res(is_not(" \t"), |v: &str| v.parse::<f64>())(rest)?;
    let (rest, timestamp_ms) = opt(preceded(
        space1,
        map_res(is_not(" \t"), |t: &str| t.parse::<i64>()),
    ))(rest)?;
    let (rest, _) = space0(rest)?;

    Ok((
        rest,
        RawSample {
            name: name.to_owned(),
            labels: labels.unwrap_or_default(),
            value,
            timestamp_ms,
        },
    ))
}

fn metric_name(input: &str) -> LineResult<'_, &str> {
    // [a-zA-Z_:][a-zA-Z0-9_:]*
    recognize(pair(
        alt((alpha1, tag("_"), tag(":"))),
        many0(alt((alphanumeric1, tag("_"), tag(":")))),
    ))(input)
}

fn label_name(input: &str) -> LineResult<'_, &str> {
    // [a-zA-Z_][a-zA-Z0-9_]*
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn label_value(input: &str) -> LineResult<'_, String> {
    let (rest, _) = char('"')(input)?;
    let (rest, value) = map(
        opt(escaped_transform(
            is_not("\\\""),
            '\\',
            alt((
                value("\\", char('\\')),
                value("\"", char('"')),
                value("\n", char('n')),
            )),
        )),
        Option::unwrap_or_default,
    )(rest)?;
    let (rest, _) = char('"')(rest)?;
    Ok((rest, value))
}

fn label_pair(input: &str) -> LineResult<'_, (String, String)> {
    map(
        separated_pair(label_name, tuple((space0, char('='), space0)), label_value),
        |(name, value)| (name.to_owned(), value),
    )(input)
}

fn label_set(input: &str) -> LineResult<'_, Vec<(String, String)>> {
    // {}  |  {a="1",b="2"}  |  {a="1",b="2",}
    preceded(
        pair(char('{'), space0),
        cut(terminated(
            separated_list0(tuple((space0, char(','), space0)), label_pair),
            tuple((space0, opt(pair(char(','), space0)), char('}'))),
        )),
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"
# HELP http_requests_total The total number of HTTP requests.
# TYPE http_requests_total counter
http_requests_total{method="post",code="200"} 1027 1395066363000
http_requests_total{method="post",code="400"}    3 1395066363000

# A plain comment
msdos_file_access_time_seconds{path="C:\\DIR\\FILE.TXT",error="Cannot find file:\n\"FILE.TXT\""} 1.458255915e9

metric_without_timestamp_and_labels 12.47

# HELP http_request_duration_seconds A histogram of the request duration.
# TYPE http_request_duration_seconds histogram
http_request_duration_seconds_bucket{le="0.05"} 24054
http_request_duration_seconds_bucket{le="+Inf"} 144320
http_request_duration_seconds_sum 53423
http_request_duration_seconds_count 144320

# TYPE rpc_duration_seconds summary
rpc_duration_seconds{quantile="0.5"} 4773
rpc_duration_seconds_sum 1.7560473e+07
rpc_duration_seconds_count 2693
"#;

    #[test]
    fn parse_families_in_order() {
        let families = parse(BODY).unwrap();
        let names: Vec<_> = families.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "http_requests_total",
                "msdos_file_access_time_seconds",
                "metric_without_timestamp_and_labels",
                "http_request_duration_seconds",
                "rpc_duration_seconds",
            ]
        );

        let requests = &families[0];
        assert_eq!(requests.kind(), MetricKind::Counter);
        assert_eq!(
            requests.help.as_deref(),
            Some("The total number of HTTP requests.")
        );
        assert_eq!(requests.samples.len(), 2);
        assert_eq!(requests.samples[1].value, 3.);
        assert_eq!(requests.samples[1].label("code"), Some("400"));
        assert_eq!(requests.samples[1].timestamp_ms, Some(1395066363000));

        let untyped = &families[2];
        assert_eq!(untyped.kind(), MetricKind::Untyped);
        assert!(untyped.samples[0].labels.is_empty());
        assert_eq!(untyped.samples[0].timestamp_ms, None);
    }

    #[test]
    fn group_histogram_and_summary_members() {
        let families = parse(BODY).unwrap();
        let histogram = &families[3];
        assert_eq!(histogram.kind(), MetricKind::Histogram);
        assert_eq!(histogram.samples.len(), 4);
        assert_eq!(histogram.samples[1].label("le"), Some("+Inf"));

        let summary = &families[4];
        assert_eq!(summary.kind(), MetricKind::Summary);
        let names: Vec<_> = summary.samples.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "rpc_duration_seconds",
                "rpc_duration_seconds_sum",
                "rpc_duration_seconds_count"
            ]
        );
    }

    #[test]
    fn suffixes_do_not_group_without_type() {
        let families = parse("foo_bucket{le=\"1\"} 1\nfoo_count 1\n").unwrap();
        assert_eq!(families.len(), 2);
        assert_eq!(families[0].name, "foo_bucket");
        assert_eq!(families[1].name, "foo_count");
    }

    #[test]
    fn unescape_label_values() {
        let families = parse(BODY).unwrap();
        let sample = &families[1].samples[0];
        assert_eq!(sample.label("path"), Some(r"C:\DIR\FILE.TXT"));
        assert_eq!(
            sample.label("error"),
            Some("Cannot find file:\n\"FILE.TXT\"")
        );
    }

    #[test]
    fn label_set_variants() {
        #[rustfmt::skip]
        let tests = [
            ("a{} 1", vec![]),
            ("a{b=\"\"} 1", vec![("b", "")]),
            ("a{b=\"1\",} 1", vec![("b", "1")]),
            ("a { b = \"1\" , c=\"2\" } 1", vec![("b", "1"), ("c", "2")]),
            ("a{b=\"1\"}1", vec![("b", "1")]),
        ];

        for (input, expected) in &tests {
            let families = parse(input).unwrap_or_else(|e| panic!("{}: {}", input, e));
            let labels: Vec<_> = families[0].samples[0]
                .labels
                .iter()
                .map(|(n, v)| (n.as_str(), v.as_str()))
                .collect();
            assert_eq!(&labels, expected, "while parsing {}", input);
        }
    }

    #[test]
    fn special_float_values() {
        let families = parse("a +Inf\nb -Inf\nc NaN\nd 2e-5\n").unwrap();
        assert_eq!(families[0].samples[0].value, f64::INFINITY);
        assert_eq!(families[1].samples[0].value, f64::NEG_INFINITY);
        assert!(families[2].samples[0].value.is_nan());
        assert_eq!(families[3].samples[0].value, 0.00002);
    }

    #[test]
    fn help_doc_escapes() {
        let families = parse("# HELP a first\\nsecond \\\\ done\n# HELP b\na 1\n").unwrap();
        assert_eq!(families[0].help.as_deref(), Some("first\nsecond \\ done"));
        assert_eq!(families[1].help.as_deref(), Some(""));
    }

    #[test]
    fn malformed_lines() {
        #[rustfmt::skip]
        let tests = [
            ("http_requests_total{method=\"GE", 1),
            ("up", 1),
            ("up 1\nup{", 2),
            ("up one", 1),
            ("up 1 2 3", 1),
            ("up 1 12.5", 1),
            ("1up 1", 1),
            ("up{1a=\"x\"} 1", 1),
            ("up{a=\"\\t\"} 1", 1),
            ("up{a=x} 1", 1),
            ("# TYPE up", 1),
            ("# TYPE up meter", 1),
            ("# TYPE up gauge\n# TYPE up gauge", 2),
            ("# HELP up a\n# HELP up b", 2),
            ("up 1\n# TYPE up gauge", 2),
            ("up{a=\"1\",a=\"2\"} 1", 1),
            ("up{__name__=\"down\"} 1", 1),
            ("# TYPE lat histogram\nlat_bucket{le=\"soon\"} 5", 2),
            ("# TYPE lat histogram\nlat_count 1\nlat_count{le=\"\"} 1", 3),
            ("# TYPE rpc summary\nrpc{quantile=\"p99\"} 1", 2),
        ];

        for (input, line) in &tests {
            match parse(input) {
                Ok(families) => panic!("expected error but found {:?} while parsing {:?}", families, input),
                Err(e) => assert_eq!(e.line(), *line, "{:?}: {}", input, e),
            }
        }
    }

    #[test]
    fn error_messages() {
        let err = parse("up 1\n\n# TYPE up gauge\n").unwrap_err();
        assert_eq!(err.line(), 3);
        assert_eq!(
            err.message(),
            "TYPE line for metric name \"up\" after its samples"
        );

        let err = parse("up{a=\"1\"").unwrap_err();
        assert_eq!(err.message(), "malformed sample line: unexpected end of line");
        assert_eq!(err.to_string(), "line 1: malformed sample line: unexpected end of line");
    }

    #[test]
    fn bound_labels_must_be_floats() {
        let err = parse("# TYPE lat histogram\nlat_bucket{le=\"soon\"} 5\nlat_count 999").unwrap_err();
        assert_eq!(err.line(), 2);
        assert_eq!(
            err.message(),
            "expected float as value for 'le' label, got \"soon\""
        );

        // only histograms and summaries give these labels a meaning
        let families = parse("lat_bucket{le=\"soon\"} 5\nrpc{quantile=\"p99\"} 1").unwrap();
        assert_eq!(families.len(), 2);

        let families = parse("# TYPE lat histogram\nlat_bucket{le=\"1.0\"} 1\nlat_bucket{le=\"inf\"} 2").unwrap();
        assert_eq!(families[0].samples.len(), 2);
    }

    #[test]
    fn exact_family_name_wins_over_suffix() {
        let body = "\
# TYPE foo histogram
# TYPE foo_count counter
foo_count 3
foo_bucket{le=\"+Inf\"} 2
";
        let families = parse(body).unwrap();
        assert_eq!(families.len(), 2);
        assert_eq!(families[0].samples.len(), 1);
        assert_eq!(families[0].samples[0].name, "foo_bucket");
        assert_eq!(families[1].name, "foo_count");
        assert_eq!(families[1].kind(), MetricKind::Counter);
        assert_eq!(families[1].samples[0].value, 3.);
    }

    #[test]
    fn type_is_case_insensitive() {
        let families = parse("# TYPE up GAUGE\nup 1").unwrap();
        assert_eq!(families[0].kind(), MetricKind::Gauge);
    }
}
