use super::Presenter;
use crate::driver::CycleError;
use crate::insight::Insight;
use crate::sampler::Sample;
use anyhow::Result;
use std::io::Write;

/// Plain-text presenter: summary block plus a table of the newest rows.
pub struct ConsolePresenter<W: Write + Send> {
    out: W,
    max_rows: usize,
}

impl ConsolePresenter<std::io::Stdout> {
    pub fn stdout(max_rows: usize) -> Self {
        Self::new(std::io::stdout(), max_rows)
    }
}

impl<W: Write + Send> ConsolePresenter<W> {
    pub fn new(out: W, max_rows: usize) -> Self {
        Self { out, max_rows }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Presenter for ConsolePresenter<W> {
    fn present(&mut self, entity_key: &str, series: &[Sample], insight: &Insight) -> Result<()> {
        writeln!(self.out, "\n=== Insights for {} ===", entity_key)?;

        let (Some(mean), Some(stddev)) = (insight.mean, insight.stddev) else {
            writeln!(self.out, "No data available yet.")?;
            return Ok(());
        };

        writeln!(self.out, "{:<20} {:.2}", "Average:", mean)?;
        writeln!(self.out, "{:<20} {:.2}", "Std deviation:", stddev)?;
        if let Some((lower, upper)) = insight.bounds() {
            writeln!(self.out, "{:<20} {:.2} .. {:.2}", "Normal band:", lower, upper)?;
        }
        writeln!(
            self.out,
            "{:<20} {} of {}",
            "Anomalies:",
            insight.anomaly_count,
            series.len()
        )?;

        let skip = series.len().saturating_sub(self.max_rows);
        if skip > 0 {
            writeln!(self.out, "({} older rows not shown)", skip)?;
        }

        writeln!(
            self.out,
            "\n{:<25} | {:>12} | {:>12} | Class",
            "Timestamp", "Value", "Rolling Avg"
        )?;
        writeln!(self.out, "{:-<25}-|-{:-<12}-|-{:-<12}-|-{:-<7}", "", "", "", "")?;

        let rows = series
            .iter()
            .zip(&insight.rolling_avg)
            .zip(&insight.classification)
            .skip(skip);
        for ((sample, rolling), class) in rows {
            writeln!(
                self.out,
                "{:<25} | {:>12.2} | {:>12.2} | {}",
                sample.timestamp.format("%Y-%m-%d %H:%M:%S"),
                sample.value,
                rolling,
                class
            )?;
        }

        self.out.flush()?;
        Ok(())
    }

    fn report_error(&mut self, entity_key: &str, error: &CycleError) -> Result<()> {
        writeln!(self.out, "Cycle failed for {}: {}", entity_key, error)?;
        self.out.flush()?;
        Ok(())
    }
}
