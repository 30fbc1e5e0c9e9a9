use nlprims_frame::FLAG_TABLE;

use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_flags, OutputFormat};

pub fn run(format: OutputFormat) -> CliResult<i32> {
    print_flags(FLAG_TABLE, format);
    Ok(SUCCESS)
}
