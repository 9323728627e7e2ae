use anyhow::Result;

use clobberer::introspection;

use super::print_json;

pub fn cmd_versions() -> Result<()> {
    print_json(&introspection::versions())
}
