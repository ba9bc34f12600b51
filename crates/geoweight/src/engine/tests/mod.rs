mod aggregate;
mod common;
mod profile;
