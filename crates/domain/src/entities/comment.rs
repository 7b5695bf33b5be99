//! 评论推送载荷。
//!
//! 评论的持久化属于外部协作方，这里只保留实时推送所需的反规范化视图。

use serde::{Deserialize, Serialize};

use crate::value_objects::{CommentId, Timestamp, UserId};

/// 评论作者的展示字段。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentAuthor {
    pub id: UserId,
    pub username: String,
}

/// 推送给客户端的评论视图。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: CommentId,
    pub text: String,
    /// 已删除评论不暴露作者信息。
    pub author: Option<CommentAuthor>,
    pub parent_id: Option<CommentId>,
    pub is_deleted: bool,
    pub reply_count: u32,
    pub total_replies: u32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl CommentView {
    /// 返回对外推送的版本：已删除的评论隐去正文和作者。
    pub fn redacted(mut self) -> Self {
        if self.is_deleted {
            self.text = "[deleted]".to_string();
            self.author = None;
        }
        self
    }

    /// 该评论事件涉及的讨论串房间键：评论自身的房间，外加父评论的房间（若是回复）。
    pub fn room_keys(&self) -> Vec<CommentId> {
        let mut keys = vec![self.id];
        if let Some(parent_id) = self.parent_id {
            keys.push(parent_id);
        }
        keys
    }
}
