use colored::*;

pub struct FeedbackAnalyzer;

impl FeedbackAnalyzer {
    pub fn analyze(output: &str) -> Option<String> {
        // Module not found among prebuilt interfaces
        if output.contains("module file")
            && (output.contains("not found") || output.contains("cannot be loaded"))
            || output.contains("module '") && output.contains("not found")
        {
            return Some(format!(
                "It looks like a {} error.\nEvery imported module needs a source with a matching {} line in {}.\nSystem modules such as {} belong in {}.",
                "Missing Module".bold().red(),
                "export module <name>;".bold().yellow(),
                "[build] srcs".bold().yellow(),
                "std".bold(),
                "external_modules".bold().green()
            ));
        }

        // Main function missing
        if output.contains("undefined reference to `main'")
            || output.contains("entry point must be defined")
        {
            return Some(format!(
                "Your project is missing a {} function.\nEnsure one plain source in {} defines the entry point.",
                "main()".bold().yellow(),
                "[build] srcs".bold().green()
            ));
        }

        // Generic missing library
        if output.contains("undefined reference to") || output.contains("symbol(s) not found") {
            return Some(format!(
                "It looks like a {} error.\nYou might be missing a library in {}.\nAdd it under {} or pass it through {}.",
                "Linker".bold().red(),
                "buildr.toml".bold().yellow(),
                "[dependencies]".bold().green(),
                "link_args".bold().green()
            ));
        }

        // Missing header
        if output.contains("fatal error: ")
            && (output.contains("No such file or directory") || output.contains("file not found"))
        {
            return Some(format!(
                "It looks like a {} error.\nYou might be missing an include path or a dependency.\nCheck your {} or {} in buildr.toml.",
                "Missing Header".bold().red(),
                "[dependencies]".bold().yellow(),
                "compile_args".bold().yellow()
            ));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_module_error() {
        let err = "main.cpp:1:8: fatal error: module 'hello' not found";
        let msg = FeedbackAnalyzer::analyze(err).unwrap();
        assert!(msg.contains("Missing Module"));
        assert!(msg.contains("export module"));
    }

    #[test]
    fn test_prebuilt_module_file_error() {
        let err = "error: module file 'build/debug/pcm/net.pcm' not found";
        assert!(FeedbackAnalyzer::analyze(err).unwrap().contains("Missing Module"));
    }

    #[test]
    fn test_linker_error() {
        let err = "main.cpp:(.text+0x1f): undefined reference to `fmt::vformat'";
        let msg = FeedbackAnalyzer::analyze(err).unwrap();
        assert!(msg.contains("Linker error"));
        assert!(msg.contains("buildr.toml"));
    }

    #[test]
    fn test_include_error() {
        let err = "main.cpp:1:10: fatal error: 'fmt/core.h' file not found";
        let msg = FeedbackAnalyzer::analyze(err).unwrap();
        assert!(msg.contains("Missing Header"));
    }

    #[test]
    fn test_main_error() {
        let err = "undefined reference to `main'";
        let msg = FeedbackAnalyzer::analyze(err).unwrap();
        assert!(msg.contains("missing a main() function"));
    }

    #[test]
    fn test_unknown_error_has_no_hint() {
        assert!(FeedbackAnalyzer::analyze("error: expected ';' after expression").is_none());
    }
}
