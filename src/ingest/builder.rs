use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use crate::domain::point::{Fields, Tags};
use crate::domain::{Batch, Point, PointError};
use crate::ingest::ValueList;

const NANOS_PER_SEC: i64 = 1_000_000_000;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EntryBuildError {
    #[error("cardinality mismatch: {values} values but {dsnames} dsnames")]
    CardinalityMismatch { values: usize, dsnames: usize },
    #[error("missing measurement name (empty plugin)")]
    MissingMeasurement,
    #[error("invalid timestamp {0}")]
    InvalidTimestamp(f64),
    #[error("invalid point: {0}")]
    Point(#[from] PointError),
}

impl EntryBuildError {
    /// Short label used for the rejected-entries counter.
    pub fn reason(&self) -> &'static str {
        match self {
            EntryBuildError::CardinalityMismatch { .. } => "cardinality_mismatch",
            EntryBuildError::MissingMeasurement => "missing_measurement",
            EntryBuildError::InvalidTimestamp(_) => "invalid_timestamp",
            EntryBuildError::Point(_) => "invalid_point",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedEntry {
    pub index: usize,
    pub error: EntryBuildError,
}

/// Converts one value list into a point named after its plugin.
pub fn build_point(vl: &ValueList) -> Result<Point, EntryBuildError> {
    if vl.values.len() != vl.dsnames.len() {
        return Err(EntryBuildError::CardinalityMismatch {
            values: vl.values.len(),
            dsnames: vl.dsnames.len(),
        });
    }
    if vl.plugin.is_empty() {
        return Err(EntryBuildError::MissingMeasurement);
    }

    let mut tags = Tags::new();
    for (key, value) in [
        ("host", &vl.host),
        ("plugin_instance", &vl.plugin_instance),
        ("type", &vl.r#type),
        ("type_instance", &vl.type_instance),
    ] {
        if !value.is_empty() {
            tags.insert(key.to_owned(), value.clone());
        }
    }

    // null samples carry no value and are left out
    let fields: Fields = vl
        .dsnames
        .iter()
        .zip(&vl.values)
        .filter_map(|(name, value)| value.map(|v| (name.clone(), v)))
        .collect();

    let ts = unix_time(vl.time)?;
    Ok(Point::new(vl.plugin.as_str(), tags, fields, ts)?)
}

/// Splits fractional epoch seconds into whole seconds and nanoseconds.
///
/// The nanosecond part is rounded half to even; a part that rounds up to a
/// full second carries into the seconds. The result must fit in signed 64-bit
/// epoch nanoseconds, the range the backend stores.
pub fn unix_time(time: f64) -> Result<OffsetDateTime, EntryBuildError> {
    let invalid = || EntryBuildError::InvalidTimestamp(time);
    if !time.is_finite() {
        return Err(invalid());
    }

    let whole = time.trunc();
    let mut secs = whole as i64;
    let mut nanos = ((time - whole) * 1e9).round_ties_even() as i64;
    if nanos.abs() >= NANOS_PER_SEC {
        secs = secs.checked_add(nanos.signum()).ok_or_else(invalid)?;
        nanos -= nanos.signum() * NANOS_PER_SEC;
    }

    OffsetDateTime::from_unix_timestamp(secs)
        .ok()
        .and_then(|t| t.checked_add(Duration::nanoseconds(nanos)))
        .filter(|t| i64::try_from(t.unix_timestamp_nanos()).is_ok())
        .ok_or_else(invalid)
}

/// Builds every entry independently and collects the successes, in entry
/// order, into a batch for `database`. Failed entries are logged and
/// returned alongside; they never stop the rest of the batch.
pub fn build_batch(entries: &[ValueList], database: &str) -> (Batch, Vec<RejectedEntry>) {
    let mut batch = Batch::new(database);
    let mut rejected = Vec::new();

    for (index, vl) in entries.iter().enumerate() {
        match build_point(vl) {
            Ok(point) => batch.add_point(point),
            Err(error) => {
                warn!(entry = index, plugin = %vl.plugin, reason = %error, "skipping value list");
                rejected.push(RejectedEntry { index, error });
            }
        }
    }

    debug!(
        points = batch.len(),
        rejected = rejected.len(),
        database,
        "batch built"
    );
    (batch, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::decode;

    fn cpu_idle() -> ValueList {
        ValueList {
            values: vec![Some(1901474177.0)],
            dstypes: vec!["counter".into()],
            dsnames: vec!["value".into()],
            time: 1280959128.0,
            interval: 10.0,
            host: "leeloo.octo.it".into(),
            plugin: "cpu".into(),
            plugin_instance: "0".into(),
            r#type: "cpu".into(),
            type_instance: "idle".into(),
        }
    }

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn builds_collectd_sample() {
        let p = build_point(&cpu_idle()).unwrap();

        assert_eq!(p.name(), "cpu");
        assert_eq!(
            p.tags(),
            &tags(&[
                ("host", "leeloo.octo.it"),
                ("plugin_instance", "0"),
                ("type", "cpu"),
                ("type_instance", "idle"),
            ])
        );
        assert_eq!(p.fields().len(), 1);
        assert_eq!(p.fields()["value"], 1.901474177e+09);
        assert_eq!(p.time().unix_timestamp(), 1280959128);
        assert_eq!(p.time().nanosecond(), 0);
    }

    #[test]
    fn empty_metadata_yields_no_tags() {
        let vl = ValueList {
            host: String::new(),
            plugin_instance: String::new(),
            r#type: String::new(),
            type_instance: String::new(),
            ..cpu_idle()
        };
        let p = build_point(&vl).unwrap();
        assert!(p.tags().is_empty());
    }

    #[test]
    fn only_non_empty_metadata_becomes_tags() {
        let vl = ValueList {
            plugin_instance: String::new(),
            type_instance: String::new(),
            ..cpu_idle()
        };
        let p = build_point(&vl).unwrap();
        assert_eq!(p.tags(), &tags(&[("host", "leeloo.octo.it"), ("type", "cpu")]));
    }

    #[test]
    fn pairs_every_value_with_its_name() {
        let vl = ValueList {
            plugin: "interface".into(),
            values: vec![Some(10.0), Some(20.0)],
            dstypes: vec!["derive".into(), "derive".into()],
            dsnames: vec!["rx".into(), "tx".into()],
            ..cpu_idle()
        };
        let p = build_point(&vl).unwrap();
        assert_eq!(p.fields()["rx"], 10.0);
        assert_eq!(p.fields()["tx"], 20.0);
    }

    #[test]
    fn null_samples_are_left_out() {
        let vl = ValueList {
            values: vec![None, Some(20.0)],
            dsnames: vec!["rx".into(), "tx".into()],
            ..cpu_idle()
        };
        let p = build_point(&vl).unwrap();
        assert_eq!(p.fields().len(), 1);
        assert_eq!(p.fields()["tx"], 20.0);

        let all_null = ValueList {
            values: vec![None],
            ..cpu_idle()
        };
        assert_eq!(
            build_point(&all_null),
            Err(EntryBuildError::Point(PointError::NoFields))
        );
    }

    #[test]
    fn cardinality_mismatch_is_an_entry_error() {
        let more_values = ValueList {
            values: vec![Some(1.0), Some(2.0)],
            ..cpu_idle()
        };
        assert_eq!(
            build_point(&more_values),
            Err(EntryBuildError::CardinalityMismatch {
                values: 2,
                dsnames: 1
            })
        );

        let more_names = ValueList {
            dsnames: vec!["a".into(), "b".into()],
            ..cpu_idle()
        };
        assert!(matches!(
            build_point(&more_names),
            Err(EntryBuildError::CardinalityMismatch { .. })
        ));
    }

    #[test]
    fn empty_plugin_is_an_entry_error() {
        let vl = ValueList {
            plugin: String::new(),
            ..cpu_idle()
        };
        assert_eq!(build_point(&vl), Err(EntryBuildError::MissingMeasurement));
        assert_eq!(
            build_point(&ValueList::default()),
            Err(EntryBuildError::MissingMeasurement)
        );
    }

    #[test]
    fn fractional_time_keeps_nanoseconds() {
        let t = unix_time(1280959128.5).unwrap();
        assert_eq!(t.unix_timestamp(), 1280959128);
        assert_eq!(t.nanosecond(), 500_000_000);

        let t = unix_time(1.25).unwrap();
        assert_eq!(t.unix_timestamp_nanos(), 1_250_000_000);

        let t = unix_time(-1.5).unwrap();
        assert_eq!(t.unix_timestamp_nanos(), -1_500_000_000);
    }

    #[test]
    fn rounding_up_to_a_full_second_carries() {
        let t = unix_time(1.9999999999).unwrap();
        assert_eq!(t.unix_timestamp(), 2);
        assert_eq!(t.nanosecond(), 0);
    }

    #[test]
    fn rejects_unrepresentable_time() {
        assert!(matches!(
            unix_time(f64::NAN),
            Err(EntryBuildError::InvalidTimestamp(_))
        ));
        assert!(unix_time(f64::INFINITY).is_err());
        assert!(unix_time(1e300).is_err());
    }

    #[test]
    fn rejects_time_past_nanosecond_range() {
        // year 5138: a valid date, but too far out for i64 nanoseconds
        assert_eq!(
            unix_time(1e11),
            Err(EntryBuildError::InvalidTimestamp(1e11))
        );
        assert!(unix_time(-1e10).is_err());
        assert!(unix_time(9_223_372_036.0).is_ok());

        let entries = vec![
            ValueList {
                time: 1e11,
                ..cpu_idle()
            },
            cpu_idle(),
        ];
        let (batch, rejected) = build_batch(&entries, "collectd");
        assert_eq!(batch.len(), 1);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].index, 0);
        assert_eq!(rejected[0].error.reason(), "invalid_timestamp");
    }

    #[test]
    fn text_that_would_break_the_line_is_an_entry_error() {
        let injected = ValueList {
            host: "evil\nmem value=9".into(),
            ..cpu_idle()
        };
        assert_eq!(
            build_point(&injected),
            Err(EntryBuildError::Point(PointError::LineBreak(
                "evil\nmem value=9".into()
            )))
        );

        let carriage = ValueList {
            plugin: "cpu\r".into(),
            ..cpu_idle()
        };
        assert!(matches!(
            build_point(&carriage),
            Err(EntryBuildError::Point(PointError::LineBreak(_)))
        ));

        let dangling = ValueList {
            type_instance: "idle\\".into(),
            ..cpu_idle()
        };
        assert!(matches!(
            build_point(&dangling),
            Err(EntryBuildError::Point(PointError::TrailingBackslash(_)))
        ));

        let name = ValueList {
            dsnames: vec!["val\nue".into()],
            ..cpu_idle()
        };
        assert_eq!(build_point(&name).unwrap_err().reason(), "invalid_point");
    }

    #[test]
    fn skips_bad_entries_and_keeps_the_rest() {
        let entries = vec![
            cpu_idle(),
            ValueList {
                values: vec![Some(1.0), Some(2.0)],
                ..cpu_idle()
            },
            ValueList {
                plugin: String::new(),
                ..cpu_idle()
            },
            ValueList {
                plugin: "load".into(),
                ..cpu_idle()
            },
        ];

        let (batch, rejected) = build_batch(&entries, "collectd");

        assert_eq!(batch.database(), "collectd");
        let names: Vec<_> = batch.points().iter().map(Point::name).collect();
        assert_eq!(names, ["cpu", "load"]);
        assert_eq!(
            rejected.iter().map(|r| r.index).collect::<Vec<_>>(),
            [1, 2]
        );
        assert_eq!(rejected[0].error.reason(), "cardinality_mismatch");
        assert_eq!(rejected[1].error.reason(), "missing_measurement");
    }

    #[test]
    fn every_entry_failing_leaves_an_empty_batch() {
        let entries = vec![ValueList::default(), ValueList::default()];
        let (batch, rejected) = build_batch(&entries, "collectd");
        assert!(batch.is_empty());
        assert_eq!(rejected.len(), 2);
    }

    #[test]
    fn rebuilding_yields_identical_tags_and_fields() {
        let body = br#"[{"values":[1,2.5],"dstypes":["gauge","gauge"],"dsnames":["a","b"],"time":1280959128.25,"interval":10,"host":"h","plugin":"p","plugin_instance":"i","type":"t","type_instance":"ti"}]"#;

        let (first, _) = build_batch(&decode(body).unwrap(), "db");
        let (second, _) = build_batch(&decode(body).unwrap(), "db");

        let encode = |b: &Batch| {
            let p = &b.points()[0];
            (
                serde_json::to_vec(p.tags()).unwrap(),
                serde_json::to_vec(p.fields()).unwrap(),
            )
        };
        assert_eq!(encode(&first), encode(&second));
        assert_eq!(first, second);
    }
}
