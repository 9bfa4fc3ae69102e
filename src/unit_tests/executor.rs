use crate::error::Error;
use crate::executor::*;

#[tokio::test]
async fn test_shell_executor_returns_output() {
    let out = ShellExecutor::new().run("echo hello").await.unwrap();
    assert_eq!(out, "hello\n");
}

#[tokio::test]
async fn test_shell_executor_combines_stderr() {
    let out = ShellExecutor::new()
        .run("echo out; echo err 1>&2")
        .await
        .unwrap();
    assert!(out.contains("out"));
    assert!(out.contains("err"));
}

#[tokio::test]
async fn test_shell_executor_stdout_only() {
    let executor = ShellExecutor::new();
    let out = executor
        .run_stdout("echo 'node-1 Ready'; echo 'E1019 memcache.go:287] noise' 1>&2")
        .await
        .unwrap();
    assert_eq!(out, "node-1 Ready\n");
    match executor.run_stdout("echo 'error: You must be logged in' 1>&2; exit 1").await {
        Err(Error::CommandFailed { output, .. }) => assert!(output.contains("logged in")),
        other => panic!("expected command failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_shell_executor_non_zero_exit() {
    match ShellExecutor::new().run("echo broken; exit 3").await {
        Err(Error::CommandFailed { command, output }) => {
            assert_eq!(command, "echo broken; exit 3");
            assert!(output.contains("broken"));
        }
        other => panic!("expected command failure, got {:?}", other),
    }
}

#[test]
fn test_last_line() {
    assert_eq!(last_line("applying\n...\ncluster created\n\n"), "cluster created");
    assert_eq!(last_line("  202410191200_sonobuoy_1.tar.gz  \n"), "202410191200_sonobuoy_1.tar.gz");
    assert_eq!(last_line(""), "");
}
