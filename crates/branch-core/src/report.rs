//! The cutflow report: a structured, queryable view of named-filter
//! accept/reject counts, printed in booking order.

#[derive(Debug, Clone, PartialEq)]
pub struct CutflowLine {
    pub name: String,
    pub accept: u64,
    pub observed: u64,
    pub pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CutflowReport {
    pub lines: Vec<CutflowLine>,
}

impl CutflowReport {
    pub fn print(&self) {
        for l in &self.lines {
            println!("{}: pass={} all={} -- {:.3} %", l.name, l.accept, l.observed, l.pct);
        }
    }
}
