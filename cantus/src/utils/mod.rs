pub(crate) mod counts;

pub(crate) use counts::Counts;
