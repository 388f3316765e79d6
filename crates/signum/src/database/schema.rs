/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Diesel table definitions.

diesel::table! {
    keys (id) {
        id -> Binary,
        fingerprint -> Text,
        key_type -> Text,
        algorithm -> Integer,
        length -> Integer,
        user_id -> Text,
        creation_date -> Text,
        expiration_date -> Nullable<Text>,
        key_data -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    signature_records (id) {
        id -> Binary,
        document_file_id -> Binary,
        kind -> Text,
        signature_file -> Nullable<Binary>,
        date_time -> Nullable<Text>,
        key_id -> Text,
        signature_id -> Nullable<Text>,
        public_key_fingerprint -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(keys, signature_records);
