pub(crate) mod demucs;
pub(crate) mod workspace;
