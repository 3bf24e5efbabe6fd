//! End-to-end coverage of the eight concrete scenarios. Each builds a
//! small in-memory module tree via `TestLoader` and drives it either
//! through `Context` directly (when a test needs to register its own
//! hooks or a custom `Client`) or through the `run()` facade (when the
//! default wiring is enough).

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use cmdtree::client::{BoxFuture, Client, PromptRequest, StdioClient};
use cmdtree::error::CliError;
use cmdtree::option::{OptionDecl, OptionValue, OptionsConfig};
use cmdtree::resolver::{CommandModule, Data, HandlerArgs, LoadResult, ModuleLoader, ParamEntry};
use cmdtree::run::{run, RunConfig};
use cmdtree::Context;

struct TestLoader<C> {
    modules: HashMap<String, CommandModule<C>>,
    dirs: HashMap<String, Vec<ParamEntry>>,
}

impl<C> TestLoader<C> {
    fn new() -> TestLoader<C> {
        TestLoader { modules: HashMap::new(), dirs: HashMap::new() }
    }

    fn with_module(mut self, path: &str, module: CommandModule<C>) -> TestLoader<C> {
        self.modules.insert(path.to_string(), module);
        self
    }

    fn with_dir(mut self, path: &str, entries: Vec<ParamEntry>) -> TestLoader<C> {
        self.dirs.insert(path.to_string(), entries);
        self
    }
}

impl<C> ModuleLoader<C> for TestLoader<C> {
    fn load(&self, dir: &str, name: &str) -> anyhow::Result<LoadResult<C>> {
        let path = format!("{}/{}", dir, name);
        if let Some(m) = self.modules.get(&path) {
            return Ok(LoadResult::Module(m.clone()));
        }
        if self.dirs.contains_key(&path) {
            return Ok(LoadResult::Directory);
        }
        Ok(LoadResult::NotFound)
    }

    fn list_param_entries(&self, dir: &str) -> anyhow::Result<Vec<ParamEntry>> {
        Ok(self.dirs.get(dir).cloned().unwrap_or_default())
    }
}

fn handler<C: 'static, F, Fut>(f: F) -> cmdtree::resolver::HandlerFn<C>
where
    F: Fn(HandlerArgs<C>) -> Fut + 'static,
    Fut: Future<Output = anyhow::Result<()>> + 'static,
{
    Rc::new(move |args: HandlerArgs<C>| Box::pin(f(args)) as Pin<Box<dyn Future<Output = anyhow::Result<()>>>>)
}

fn base_config() -> RunConfig<()> {
    RunConfig { commands_dir: Some("commands".to_string()), ..RunConfig::default() }
}

#[tokio::test]
async fn end_with_option_value() {
    let mut options = OptionsConfig::new();
    options.insert("name".to_string(), OptionDecl::string());

    let module = CommandModule::new(handler(|args: HandlerArgs<()>| async move {
        let name = args.options.get("name", None).await?.and_then(|v| v.as_str().map(str::to_string));
        args.state.end(Some(Data::String(format!("Hi {}", name.unwrap_or_default())))).await;
        Ok(())
    }))
    .options(options);

    let loader = Rc::new(TestLoader::new().with_module("commands/hello", module));

    let config = RunConfig { command: Some("hello --name Alice".to_string()), ..base_config() };
    let result = run((), loader, config, Data::Null).await.unwrap();

    assert_eq!(result, Data::String("Hi Alice".to_string()));
}

#[tokio::test]
async fn nested_param_and_force_option() {
    let mut options = OptionsConfig::new();
    options.insert("force".to_string(), OptionDecl::boolean());

    let delete_module = CommandModule::new(handler(|args: HandlerArgs<()>| async move {
        let id = args.params.get("id").and_then(|p| p.as_single()).unwrap_or("").to_string();
        let force = args.options.get("force", None).await?.and_then(|v| v.as_bool()).unwrap_or(false);
        args.state.end(Some(Data::String(format!("deleted user {} force={}", id, force)))).await;
        Ok(())
    }))
    .options(options);

    let loader = Rc::new(
        TestLoader::new()
            .with_dir("commands/users", vec![ParamEntry { entry_name: "[id]".to_string(), param_name: "id".to_string(), spread: false }])
            .with_module("commands/users/[id]/delete", delete_module),
    );

    let config = RunConfig { command: Some("users 123 delete --force".to_string()), ..base_config() };
    let result = run((), loader, config, Data::Null).await.unwrap();

    assert_eq!(result, Data::String("deleted user 123 force=true".to_string()));
}

#[tokio::test]
async fn requires_subcommand() {
    let prod_module = CommandModule::new(handler(|args: HandlerArgs<()>| async move {
        args.state.end(Some(Data::String("deployed".to_string()))).await;
        Ok(())
    }));

    let deploy_module = CommandModule::new(handler(|args: HandlerArgs<()>| async move {
        args.state.next(Some(args.data)).await;
        Ok(())
    }))
    .requires_subcommand(true);

    let loader_with_prod = Rc::new(
        TestLoader::new()
            .with_module("commands/deploy", deploy_module)
            .with_module("commands/deploy/prod", prod_module),
    );

    let config = RunConfig { command: Some("deploy prod".to_string()), ..base_config() };
    let result = run((), loader_with_prod, config, Data::Null).await.unwrap();
    assert_eq!(result, Data::String("deployed".to_string()));

    let deploy_module_alone = CommandModule::new(handler(|args: HandlerArgs<()>| async move {
        args.state.next(Some(args.data)).await;
        Ok(())
    }))
    .requires_subcommand(true);
    let loader_without_prod = Rc::new(TestLoader::new().with_module("commands/deploy", deploy_module_alone));

    let config = RunConfig { command: Some("deploy".to_string()), ..base_config() };
    let err = run((), loader_without_prod, config, Data::Null).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::SubcommandRequired { .. })));
}

#[tokio::test]
async fn default_command_on_empty_input() {
    let build_module = CommandModule::new(handler(|args: HandlerArgs<()>| async move {
        args.state.end(Some(Data::String("built".to_string()))).await;
        Ok(())
    }));
    let loader = Rc::new(TestLoader::new().with_module("commands/build", build_module));

    let config = RunConfig {
        command: Some("".to_string()),
        default_command: Some("build".to_string()),
        ..base_config()
    };
    let result = run((), loader, config, Data::Null).await.unwrap();
    assert_eq!(result, Data::String("built".to_string()));
}

#[tokio::test]
async fn middleware_chain_forwards_data_unchanged() {
    let loader = Rc::new(
        TestLoader::new()
            .with_module("commands/foo", CommandModule::<()>::pass_through())
            .with_module("commands/foo/bar", CommandModule::<()>::pass_through())
            .with_module("commands/foo/bar/baz", CommandModule::<()>::pass_through()),
    );

    let config = RunConfig { command: Some("foo bar baz".to_string()), ..base_config() };
    let result = run((), loader, config, Data::String("x".to_string())).await.unwrap();
    assert_eq!(result, Data::String("x".to_string()));
}

#[tokio::test]
async fn end_short_circuits_later_handlers() {
    let foo_module = CommandModule::new(handler(|args: HandlerArgs<()>| async move {
        args.state.end(Some(Data::String("stop".to_string()))).await;
        Ok(())
    }));
    let bar_invoked = Rc::new(RefCell::new(false));
    let bar_invoked_clone = bar_invoked.clone();
    let bar_module = CommandModule::new(Rc::new(move |args: HandlerArgs<()>| {
        let bar_invoked = bar_invoked_clone.clone();
        Box::pin(async move {
            *bar_invoked.borrow_mut() = true;
            args.state.next(Some(args.data)).await;
            Ok(())
        }) as Pin<Box<dyn Future<Output = anyhow::Result<()>>>>
    }));

    let loader: Rc<dyn ModuleLoader<()>> = Rc::new(
        TestLoader::new().with_module("commands/foo", foo_module).with_module("commands/foo/bar", bar_module),
    );

    let context = Context::new(
        (),
        "foo bar",
        "commands",
        Rc::new(StdioClient),
        discard_logger(),
        loader,
        Vec::new(),
    )
    .unwrap();

    let after_command_count = Rc::new(RefCell::new(0));
    {
        let after_command_count = after_command_count.clone();
        context.on_after_command(cmdtree::hooks::hook(move |_payload: &mut cmdtree::hooks::AfterCommandPayload| {
            let after_command_count = after_command_count.clone();
            Box::pin(async move {
                *after_command_count.borrow_mut() += 1;
                Ok(())
            })
        }));
    }

    context.prepare().await.unwrap();
    let result = context.execute(Data::Null).await.unwrap();

    assert_eq!(result, Data::String("stop".to_string()));
    assert!(!*bar_invoked.borrow());
    assert_eq!(*after_command_count.borrow(), 1);
}

#[tokio::test]
async fn numeric_option_rejects_non_numeric() {
    let mut options = OptionsConfig::new();
    options.insert("port".to_string(), OptionDecl::number());

    let module = CommandModule::new(handler(|args: HandlerArgs<()>| async move {
        args.state.next(Some(args.data)).await;
        Ok(())
    }))
    .options(options);

    let loader = Rc::new(TestLoader::new().with_module("commands/cmd", module));

    let config = RunConfig { command: Some("cmd --port=abc".to_string()), ..base_config() };
    let err = run((), loader, config, Data::Null).await.unwrap_err();
    assert!(err.to_string().to_lowercase().contains("port"));
}

struct RecordingClient {
    prompted: Rc<RefCell<bool>>,
    answer: OptionValue,
}

impl Client for RecordingClient {
    fn log(&self, _logger: &slog::Logger, _msg: &str) {}
    fn error(&self, _logger: &slog::Logger, _msg: &str) {}

    fn prompt<'a>(&'a self, _request: PromptRequest) -> BoxFuture<'a, anyhow::Result<OptionValue>> {
        Box::pin(async move {
            *self.prompted.borrow_mut() = true;
            Ok(self.answer.clone())
        })
    }

    fn confirm<'a>(&'a self, _message: &'a str) -> BoxFuture<'a, anyhow::Result<bool>> {
        Box::pin(async move { Ok(true) })
    }
}

#[tokio::test]
async fn required_option_without_default_prompts_on_read() {
    let mut options = OptionsConfig::new();
    options.insert("env".to_string(), OptionDecl::string().required(true));

    let prompted = Rc::new(RefCell::new(false));
    let prompted_for_handler = prompted.clone();

    let module = CommandModule::new(Rc::new(move |args: HandlerArgs<()>| {
        let expect_prompted = prompted_for_handler.clone();
        Box::pin(async move {
            let value = args.options.get("env", None).await?;
            assert_eq!(value.as_ref().and_then(|v| v.as_str()), Some("staging"));
            assert!(*expect_prompted.borrow());
            args.state.next(Some(args.data)).await;
            Ok(())
        }) as Pin<Box<dyn Future<Output = anyhow::Result<()>>>>
    }))
    .options(options);

    let loader: Rc<dyn ModuleLoader<()>> = Rc::new(TestLoader::new().with_module("commands/cmd", module));

    let client: Rc<dyn Client> = Rc::new(RecordingClient { prompted: prompted.clone(), answer: OptionValue::Str("staging".to_string()) });

    let config = RunConfig { command: Some("cmd".to_string()), client: Some(client), ..base_config() };
    run((), loader, config, Data::Null).await.unwrap();

    assert!(*prompted.borrow());
}

fn discard_logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}
