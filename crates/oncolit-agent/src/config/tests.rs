#[cfg(test)]
mod tests {
    use super::super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.llm.provider, LlmProvider::Openai);
        assert_eq!(config.llm.model, "gpt-5-nano");
        assert_eq!(config.llm.reasoning_effort.as_deref(), Some("minimal"));
        assert_eq!(config.pubmed.tool, "oncolit");
        assert_eq!(config.pubmed.retmax, 100);
        assert_eq!(config.pubmed.batch_size, 50);
        assert_eq!(config.analysis.prompt_style, PromptStyle::Simple);
        assert_eq!(config.analysis.max_concurrent, 10);
        assert_eq!(config.analysis.strategy, BatchStrategy::Chunked);
        assert_eq!(config.analysis.save_dir, PathBuf::from("results"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [llm]
            provider = "ollama"
            model = "llama3.1:8b"

            [analysis]
            prompt_style = "detailed"
            strategy = "windowed"
            "#,
        )
        .unwrap();
        assert_eq!(config.llm.provider, LlmProvider::Ollama);
        assert_eq!(config.llm.model, "llama3.1:8b");
        assert_eq!(config.analysis.prompt_style, PromptStyle::Detailed);
        assert_eq!(config.analysis.strategy, BatchStrategy::Windowed);
        assert_eq!(config.analysis.max_concurrent, 10);
        assert_eq!(config.pubmed.retmax, 100);
    }

    #[test]
    fn test_env_fills_only_empty_values() {
        let mut config = Config::default();
        config.pubmed.email = "file@example.org".to_string();
        config.apply_env(env(&[
            ("OPENAI_API_KEY", "sk-env"),
            ("NCBI_EMAIL", "env@example.org"),
            ("NCBI_API_KEY", "  "),
        ]));
        assert_eq!(config.llm.api_key, "sk-env");
        assert_eq!(config.pubmed.email, "file@example.org");
        assert_eq!(config.pubmed.api_key, "");
    }

    #[test]
    fn test_missing_email_is_rejected() {
        let mut config = Config::default();
        config.llm.api_key = "sk-test".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("NCBI email required"));
    }

    #[test]
    fn test_openai_requires_key_but_ollama_does_not() {
        let mut config = Config::default();
        config.pubmed.email = "me@example.org".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("OpenAI API key"));

        config.llm.provider = LlmProvider::Ollama;
        assert!(config.validate().is_ok());
        let backend = config.build_backend(None);
        assert!(backend.is_local());
        assert_eq!(backend.model_id(), "gpt-5-nano");
    }

    #[test]
    fn test_openai_compatible_requires_base_url() {
        let mut config = Config::default();
        config.pubmed.email = "me@example.org".to_string();
        config.llm.provider = LlmProvider::OpenaiCompatible;
        assert!(config.validate().is_err());
        config.llm.base_url = Some("http://localhost:1234".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ranges_are_clamped() {
        let mut config = Config::default();
        config.pubmed.email = "me@example.org".to_string();
        config.llm.api_key = "sk-test".to_string();
        config.pubmed.retmax = 50_000;
        config.pubmed.batch_size = 0;
        config.validate().unwrap();
        assert_eq!(config.pubmed.retmax, 10_000);
        assert_eq!(config.pubmed.batch_size, 1);
    }

    #[test]
    fn test_cli_overrides_reach_analyzer_config() {
        let config = Config::default();
        let analyzer = config.analyzer_config(Some("gpt-4o-mini".to_string()), Some(PromptStyle::Detailed));
        assert_eq!(analyzer.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(analyzer.prompt_style, PromptStyle::Detailed);

        let analyzer = config.analyzer_config(None, None);
        assert_eq!(analyzer.model.as_deref(), Some("gpt-5-nano"));
        assert_eq!(analyzer.prompt_style, PromptStyle::Simple);
    }

    #[test]
    fn test_from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oncolit.toml");
        std::fs::write(&path, "[pubmed]\nemail = \"lab@example.org\"\nbatch_size = 200\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.pubmed.email, "lab@example.org");
        assert_eq!(config.pubmed.batch_size, 200);

        let pubmed = config.pubmed_config().unwrap();
        assert_eq!(pubmed.batch_size, 200);
        assert!(pubmed.api_key.is_none());
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oncolit.toml");
        std::fs::write(&path, "[analysis]\nprompt_style = \"terse\"\n").unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn test_example_file_parses_to_defaults() {
        let config: Config = toml::from_str(include_str!("../../../../oncolit.example.toml")).unwrap();
        let defaults = Config::default();
        assert_eq!(config.llm.model, defaults.llm.model);
        assert_eq!(config.pubmed.retmax, defaults.pubmed.retmax);
        assert_eq!(config.analysis.strategy, defaults.analysis.strategy);
    }
}
