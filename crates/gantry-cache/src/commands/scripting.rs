use async_trait::async_trait;
use redis::Value;

use crate::backend::Backend;
use crate::client::ScriptingCommands;
use crate::error::CacheResult;
use crate::topology::{Access, Topology};

const EVAL: &str = "EVAL";
const EVALSHA: &str = "EVALSHA";
const SCRIPT_LOAD: &str = "SCRIPT LOAD";

fn script_cmd(name: &str, body: &str, keys: &[&str], args: &[&str]) -> redis::Cmd {
    let mut cmd = redis::cmd(name);
    cmd.arg(body).arg(keys.len()).arg(keys).arg(args);
    cmd
}

#[async_trait]
impl<T: Topology> ScriptingCommands for Backend<T> {
    async fn eval(&self, script: &str, keys: &[&str], args: &[&str]) -> CacheResult<Value> {
        let cmd = script_cmd("EVAL", script, keys, args);
        self.run(EVAL, keys.first().copied(), Access::Write, &cmd)
            .await
    }

    async fn eval_sha(&self, sha1: &str, keys: &[&str], args: &[&str]) -> CacheResult<Value> {
        let cmd = script_cmd("EVALSHA", sha1, keys, args);
        self.run(EVALSHA, keys.first().copied(), Access::Write, &cmd)
            .await
    }

    async fn script_load(&self, script: &str) -> CacheResult<String> {
        self.run(
            SCRIPT_LOAD,
            None,
            Access::Write,
            redis::cmd("SCRIPT").arg("LOAD").arg(script),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_cmd_layout() {
        let cmd = script_cmd("EVAL", "return 1", &["a", "b"], &["x"]);
        assert_eq!(
            cmd.get_packed_command(),
            b"*6\r\n$4\r\nEVAL\r\n$8\r\nreturn 1\r\n$1\r\n2\r\n$1\r\na\r\n$1\r\nb\r\n$1\r\nx\r\n"
                .to_vec()
        );
    }
}
