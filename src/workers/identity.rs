//! 每次调用的用户身份
//!
//! 阻塞 worker 在 spawn_blocking 线程里运行，线程池线程不继承调用方状态；
//! 派发器在调用 process 前用 scope 重新设置当前用户，返回时恢复原值。

use std::cell::RefCell;

thread_local! {
    static CURRENT_USER: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// 在 f 执行期间把当前线程的用户设为 user_id；"default_user" 视为匿名
pub fn scope<R>(user_id: &str, f: impl FnOnce() -> R) -> R {
    let next = (!user_id.is_empty() && user_id != "default_user").then(|| user_id.to_string());
    let previous = CURRENT_USER.with(|cell| cell.replace(next));
    let _restore = Restore(previous);
    f()
}

/// 当前线程绑定的用户（未设置时为 None）
pub fn current_user() -> Option<String> {
    CURRENT_USER.with(|cell| cell.borrow().clone())
}

struct Restore(Option<String>);

impl Drop for Restore {
    fn drop(&mut self) {
        let previous = self.0.take();
        CURRENT_USER.with(|cell| *cell.borrow_mut() = previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_sets_and_restores() {
        assert_eq!(current_user(), None);
        let inner = scope("alice", || {
            let nested = scope("bob", current_user);
            assert_eq!(nested.as_deref(), Some("bob"));
            current_user()
        });
        assert_eq!(inner.as_deref(), Some("alice"));
        assert_eq!(current_user(), None);
    }

    #[test]
    fn test_default_user_is_anonymous() {
        assert_eq!(scope("default_user", current_user), None);
    }

    #[test]
    fn test_restored_after_panic() {
        let caught = std::panic::catch_unwind(|| scope("carol", || panic!("boom")));
        assert!(caught.is_err());
        assert_eq!(current_user(), None);
    }
}
