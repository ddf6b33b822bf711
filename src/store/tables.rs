//! Parquet helpers for the two enrollment tables. Tables are read and
//! rewritten whole; row counts stay in the dozens, not millions.

use std::path::Path;

use anyhow::{anyhow, Result};
use polars::prelude::*;

use super::{Identity, Template};

pub(super) fn identities_schema_df() -> DataFrame {
    let ids: Series = Series::new("id".into(), Vec::<String>::new());
    let names: Series = Series::new("name".into(), Vec::<String>::new());
    let uids: Series = Series::new("uid".into(), Vec::<i64>::new());
    DataFrame::new(vec![ids.into(), names.into(), uids.into()]).unwrap()
}

pub(super) fn templates_schema_df() -> DataFrame {
    let ids: Series = Series::new("id".into(), Vec::<String>::new());
    let owners: Series = Series::new("identity_id".into(), Vec::<String>::new());
    let samples: Series = Series::new("encoded_sample".into(), Vec::<String>::new());
    DataFrame::new(vec![ids.into(), owners.into(), samples.into()]).unwrap()
}

pub(super) fn read_table(path: &Path, empty: fn() -> DataFrame) -> Result<DataFrame> {
    if !path.exists() {
        return Ok(empty());
    }
    let file = std::fs::File::open(path)?;
    let df = ParquetReader::new(file).finish()?;
    Ok(df)
}

pub(super) fn write_table(path: &Path, mut df: DataFrame) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).ok();
    }
    let mut f = std::fs::File::create(path)?;
    ParquetWriter::new(&mut f).finish(&mut df)?;
    Ok(())
}

fn str_at(df: &DataFrame, col: &str, i: usize) -> Result<String> {
    match df.column(col)?.get(i)? {
        AnyValue::String(s) => Ok(s.to_string()),
        AnyValue::StringOwned(s) => Ok(s.to_string()),
        other => Err(anyhow!("unexpected value {:?} in column '{}'", other, col)),
    }
}

pub(super) fn scan_identities(df: &DataFrame) -> Result<Vec<Identity>> {
    let mut out = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        out.push(Identity {
            id: str_at(df, "id", i)?,
            name: str_at(df, "name", i)?,
            uid: df.column("uid")?.i64()?.get(i).unwrap_or(0),
        });
    }
    Ok(out)
}

pub(super) fn scan_templates(df: &DataFrame) -> Result<Vec<Template>> {
    let mut out = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        out.push(Template {
            id: str_at(df, "id", i)?,
            identity_id: str_at(df, "identity_id", i)?,
            encoded_sample: str_at(df, "encoded_sample", i)?,
        });
    }
    Ok(out)
}

pub(super) fn identities_df(rows: &[Identity]) -> Result<DataFrame> {
    let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
    let names: Vec<String> = rows.iter().map(|r| r.name.clone()).collect();
    let uids: Vec<i64> = rows.iter().map(|r| r.uid).collect();
    let df = DataFrame::new(vec![
        Series::new("id".into(), ids).into(),
        Series::new("name".into(), names).into(),
        Series::new("uid".into(), uids).into(),
    ])?;
    Ok(df)
}

pub(super) fn templates_df(rows: &[Template]) -> Result<DataFrame> {
    let ids: Vec<String> = rows.iter().map(|t| t.id.clone()).collect();
    let owners: Vec<String> = rows.iter().map(|t| t.identity_id.clone()).collect();
    let samples: Vec<String> = rows.iter().map(|t| t.encoded_sample.clone()).collect();
    let df = DataFrame::new(vec![
        Series::new("id".into(), ids).into(),
        Series::new("identity_id".into(), owners).into(),
        Series::new("encoded_sample".into(), samples).into(),
    ])?;
    Ok(df)
}
